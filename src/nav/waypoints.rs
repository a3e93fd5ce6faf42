/// Waypoint graph and the graph-following navigator.
///
/// The graph is static, pre-authored data: nodes with positions, optional
/// speed limits and team tags, and bidirectional connections. The navigator
/// walks it greedily. With a destination it picks the neighbor pointing most
/// toward it. Without one it wanders to a random neighbor.
///
/// The greedy choice is a local heuristic, not a graph search. It can pick a
/// neighbor that is locally better but globally worse.

use bevy::prelude::*;
use bevy_common_assets::ron::RonAssetPlugin;
use rand::Rng;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::config::NavConfig;
use super::math::horizontal_distance;
use super::resources::ActiveWaypointGraph;

// ============================================================================
// Graph Data
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WaypointId(pub u32);

/// Team affiliation of agents and team-restricted nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(pub u8);

fn default_reach_radius() -> f32 {
    2.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WaypointNode {
    pub id: WaypointId,
    pub position: Vec3,
    #[serde(default)]
    pub connections: SmallVec<[WaypointId; 4]>,
    #[serde(default)]
    pub speed_limit: Option<f32>,
    /// Only agents of this team may use the node.
    #[serde(default)]
    pub team: Option<TeamId>,
    #[serde(default = "default_reach_radius")]
    pub reach_radius: f32,
}

impl WaypointNode {
    pub fn new(id: u32, position: Vec3) -> Self {
        Self {
            id: WaypointId(id),
            position,
            connections: SmallVec::new(),
            speed_limit: None,
            team: None,
            reach_radius: default_reach_radius(),
        }
    }

    pub fn with_connections(mut self, ids: &[u32]) -> Self {
        self.connections = ids.iter().copied().map(WaypointId).collect();
        self
    }

    pub fn with_speed_limit(mut self, limit: f32) -> Self {
        self.speed_limit = Some(limit);
        self
    }

    pub fn with_team(mut self, team: TeamId) -> Self {
        self.team = Some(team);
        self
    }

    /// Untagged nodes are open to everyone; tagged nodes only to their team.
    pub fn accessible_to(&self, team: Option<TeamId>) -> bool {
        match self.team {
            None => true,
            Some(owner) => team == Some(owner),
        }
    }
}

/// RON-authored form of a waypoint graph (`*.waypoints.ron`).
#[derive(Asset, TypePath, Clone, Debug, Default, Serialize, Deserialize)]
pub struct WaypointGraphAsset {
    pub nodes: Vec<WaypointNode>,
}

/// Normalized waypoint graph with an id index.
///
/// Connections are made symmetric on construction and links to unknown ids
/// are dropped.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(from = "WaypointGraphAsset", into = "WaypointGraphAsset")]
pub struct WaypointGraph {
    nodes: Vec<WaypointNode>,
    index: FxHashMap<WaypointId, usize>,
}

impl From<WaypointGraphAsset> for WaypointGraph {
    fn from(asset: WaypointGraphAsset) -> Self {
        Self::from_nodes(asset.nodes)
    }
}

impl From<WaypointGraph> for WaypointGraphAsset {
    fn from(graph: WaypointGraph) -> Self {
        Self { nodes: graph.nodes }
    }
}

impl WaypointGraph {
    pub fn from_nodes(mut nodes: Vec<WaypointNode>) -> Self {
        let mut last = FxHashMap::default();
        for (i, node) in nodes.iter().enumerate() {
            if last.insert(node.id, i).is_some() {
                warn!("[WAYPOINT] Duplicate waypoint id {:?}, keeping the last one", node.id);
            }
        }
        if last.len() != nodes.len() {
            let mut i = 0;
            nodes.retain(|node| {
                let keep = last[&node.id] == i;
                i += 1;
                keep
            });
        }
        let index: FxHashMap<WaypointId, usize> =
            nodes.iter().enumerate().map(|(i, node)| (node.id, i)).collect();

        let mut edges = Vec::new();
        for node in &nodes {
            for &other in &node.connections {
                if other == node.id {
                    continue;
                }
                if !index.contains_key(&other) {
                    warn!("[WAYPOINT] Node {:?} links to unknown node {:?}", node.id, other);
                    continue;
                }
                edges.push((node.id, other));
            }
        }

        for node in &mut nodes {
            node.connections.clear();
        }
        for (a, b) in edges {
            for (from, to) in [(a, b), (b, a)] {
                let connections = &mut nodes[index[&from]].connections;
                if !connections.contains(&to) {
                    connections.push(to);
                }
            }
        }

        Self { nodes, index }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[WaypointNode] {
        &self.nodes
    }

    pub fn node(&self, id: WaypointId) -> Option<&WaypointNode> {
        self.index.get(&id).map(|&i| &self.nodes[i])
    }

    /// Connected nodes usable by `team`.
    pub fn neighbors(
        &self,
        id: WaypointId,
        team: Option<TeamId>,
    ) -> impl Iterator<Item = &WaypointNode> {
        self.node(id)
            .into_iter()
            .flat_map(|node| node.connections.iter())
            .filter_map(|&other| self.node(other))
            .filter(move |node| node.accessible_to(team))
    }

    /// Closest node usable by `team`.
    pub fn nearest(&self, position: Vec3, team: Option<TeamId>) -> Option<&WaypointNode> {
        self.nodes
            .iter()
            .filter(|node| node.accessible_to(team))
            .min_by(|a, b| {
                let da = horizontal_distance(position, a.position);
                da.total_cmp(&horizontal_distance(position, b.position))
            })
    }
}

// ============================================================================
// Navigator
// ============================================================================

/// What the agent should drive toward this tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WaypointStep {
    /// Drive to a graph node.
    Heading { target: Vec3, speed_limit: Option<f32> },
    /// No neighbor gets closer; drive straight to the destination.
    FinalApproach(Vec3),
    /// Within stopping distance of the destination.
    Arrived,
    /// At a node with nowhere to go.
    Holding,
    /// No node is usable by this agent.
    NoNode,
}

/// Per-agent graph traversal state.
#[derive(Clone, Debug, Default)]
pub struct WaypointNavigator {
    current: Option<WaypointId>,
    final_approach: bool,
}

impl WaypointNavigator {
    pub fn current(&self) -> Option<WaypointId> {
        self.current
    }

    pub fn is_final_approach(&self) -> bool {
        self.final_approach
    }

    pub fn reset(&mut self) {
        self.current = None;
        self.final_approach = false;
    }

    /// Advances along the graph and returns the current sub-target.
    pub fn advance<R: Rng>(
        &mut self,
        graph: &WaypointGraph,
        position: Vec3,
        destination: Option<Vec3>,
        team: Option<TeamId>,
        rng: &mut R,
        config: &NavConfig,
    ) -> WaypointStep {
        if let Some(dest) = destination {
            if horizontal_distance(position, dest) <= config.planner.stopping_distance {
                return WaypointStep::Arrived;
            }
            if self.final_approach {
                return WaypointStep::FinalApproach(dest);
            }
        }

        let node = match self.current.and_then(|id| graph.node(id)) {
            Some(node) => node,
            None => {
                let Some(nearest) = graph.nearest(position, team) else {
                    return WaypointStep::NoNode;
                };
                debug!("[WAYPOINT] Starting from nearest node {:?}", nearest.id);
                self.current = Some(nearest.id);
                nearest
            }
        };

        let reach = node.reach_radius.max(config.waypoints.reach_floor);
        if horizontal_distance(position, node.position) >= reach {
            return WaypointStep::Heading {
                target: node.position,
                speed_limit: node.speed_limit,
            };
        }

        let next = match destination {
            Some(dest) => {
                let Some(next) = toward(graph, node, dest, team) else {
                    debug!("[WAYPOINT] No neighbor of {:?} is closer, final approach", node.id);
                    self.final_approach = true;
                    return WaypointStep::FinalApproach(dest);
                };
                next
            }
            None => {
                let options: SmallVec<[&WaypointNode; 8]> =
                    graph.neighbors(node.id, team).collect();
                if options.is_empty() {
                    return WaypointStep::Holding;
                }
                options[rng.random_range(0..options.len())]
            }
        };

        trace!("[WAYPOINT] {:?} -> {:?}", node.id, next.id);
        self.current = Some(next.id);
        WaypointStep::Heading {
            target: next.position,
            speed_limit: next.speed_limit,
        }
    }
}

/// Neighbor whose direction best matches the direction to `dest`, or `None`
/// when no neighbor is closer to `dest` than `node` itself.
fn toward<'a>(
    graph: &'a WaypointGraph,
    node: &WaypointNode,
    dest: Vec3,
    team: Option<TeamId>,
) -> Option<&'a WaypointNode> {
    let here = horizontal_distance(node.position, dest);
    let wanted = (dest - node.position).with_y(0.0).normalize_or_zero();

    let mut any_closer = false;
    let mut best: Option<(f32, &WaypointNode)> = None;
    for neighbor in graph.neighbors(node.id, team) {
        any_closer |= horizontal_distance(neighbor.position, dest) < here;
        let heading = (neighbor.position - node.position).with_y(0.0).normalize_or_zero();
        let score = heading.dot(wanted);
        if best.is_none_or(|(s, _)| score > s) {
            best = Some((score, neighbor));
        }
    }
    if !any_closer {
        return None;
    }
    best.map(|(_, n)| n)
}

// ============================================================================
// Asset Loading
// ============================================================================

/// Handle of the graph asset feeding [`ActiveWaypointGraph`].
#[derive(Resource)]
pub struct WaypointGraphHandle(pub Handle<WaypointGraphAsset>);

/// Loads `*.waypoints.ron` assets and activates the one named by
/// [`WaypointGraphHandle`].
pub struct WaypointGraphAssetPlugin;

impl Plugin for WaypointGraphAssetPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(RonAssetPlugin::<WaypointGraphAsset>::new(&["waypoints.ron"]))
            .init_resource::<ActiveWaypointGraph>()
            .add_systems(Update, activate_waypoint_graph);
    }
}

fn activate_waypoint_graph(
    handle: Option<Res<WaypointGraphHandle>>,
    graphs: Res<Assets<WaypointGraphAsset>>,
    mut events: MessageReader<AssetEvent<WaypointGraphAsset>>,
    mut active: ResMut<ActiveWaypointGraph>,
) {
    let Some(handle) = handle else { return };
    for event in events.read() {
        if event.is_modified(handle.0.id()) || event.is_loaded_with_dependencies(handle.0.id()) {
            if let Some(asset) = graphs.get(&handle.0) {
                let graph = WaypointGraph::from(asset.clone());
                info!("[WAYPOINT] Activated waypoint graph with {} nodes", graph.len());
                active.0 = Some(graph);
            }
        }
    }
}
