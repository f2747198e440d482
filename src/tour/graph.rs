//! Panoramas linked by hotspots form a directed graph. Cycles are normal:
//! most tours let visitors walk back the way they came.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::VecDeque;

use super::model::HotspotId;
use super::model::Panorama;
use super::model::PanoramaId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TourEdge {
    pub from: PanoramaId,
    pub hotspot: HotspotId,
    pub to: PanoramaId,
}

#[derive(Debug, Default)]
pub struct TourGraph {
    names: BTreeMap<PanoramaId, String>,
    edges: Vec<TourEdge>,
}

impl TourGraph {
    /// Only persisted panoramas and hotspots take part in the graph.
    pub fn build(panoramas: &[Panorama]) -> Self {
        let mut graph = TourGraph::default();
        for panorama in panoramas {
            let Some(from) = panorama.id else {
                continue;
            };
            graph.names.insert(from, panorama.display_name().to_string());
            for hotspot in &panorama.hotspots {
                if let (Some(hotspot_id), Some(to)) = (hotspot.id, hotspot.target_panorama_id) {
                    graph.edges.push(TourEdge { from, hotspot: hotspot_id, to });
                }
            }
        }
        graph
    }

    pub fn contains(&self, id: PanoramaId) -> bool {
        self.names.contains_key(&id)
    }

    pub fn name(&self, id: PanoramaId) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    pub fn outgoing(&self, id: PanoramaId) -> impl Iterator<Item = &TourEdge> {
        self.edges.iter().filter(move |edge| edge.from == id)
    }

    /// Edges from other panoramas pointing at `id`.
    pub fn incoming(&self, id: PanoramaId) -> impl Iterator<Item = &TourEdge> {
        self.edges.iter().filter(move |edge| edge.to == id && edge.from != id)
    }

    /// Names of the panoramas that still link to `id`, deduplicated.
    pub fn referrers(&self, id: PanoramaId) -> Vec<String> {
        let sources: BTreeSet<PanoramaId> = self.incoming(id).map(|edge| edge.from).collect();
        sources.into_iter().map(|source| self.name(source).map(str::to_string).unwrap_or_else(|| format!("#{source}"))).collect()
    }

    /// A panorama can be removed without leaving hotspots that point nowhere.
    pub fn can_delete(&self, id: PanoramaId) -> bool {
        self.incoming(id).next().is_none()
    }

    /// Edges whose target no longer exists.
    pub fn dangling_edges(&self) -> Vec<TourEdge> {
        self.edges.iter().filter(|edge| !self.contains(edge.to)).copied().collect()
    }

    /// Every panorama a visitor can walk to from `start`, including `start`.
    pub fn reachable_from(&self, start: PanoramaId) -> BTreeSet<PanoramaId> {
        let mut seen = BTreeSet::new();
        if !self.contains(start) {
            return seen;
        }

        let mut queue = VecDeque::from([start]);
        seen.insert(start);
        while let Some(current) = queue.pop_front() {
            for edge in self.outgoing(current) {
                if self.contains(edge.to) && seen.insert(edge.to) {
                    queue.push_back(edge.to);
                }
            }
        }
        seen
    }
}
