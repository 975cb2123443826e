//! Board graph: hexes, vertices (settlement slots), edges (road slots) and ports.
//!
//! A board is built once per game from a [`LayoutSpec`] and never changes
//! afterwards. Ids are stable strings (`H0..H18`, `V{n}`, `E{n}`, `P{n}`) so
//! they can be used directly as keys in the game state and on the wire.

use crate::hex::{board_coords, corner_offsets, Point, BOARD_RADIUS};
use crate::resources::Resource;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Pixel radius of a hex in board space
pub const HEX_SIZE: f64 = 100.0;

/// Number of hexes on a standard board
pub const HEX_COUNT: usize = 19;

/// Index of the center hex in sorted coordinate order
pub const CENTER_INDEX: usize = 9;

/// Port kinds in the order they are dealt around the coast
const PORT_KINDS: [PortKind; 9] = [
    PortKind::Generic,
    PortKind::Wood,
    PortKind::Generic,
    PortKind::Brick,
    PortKind::Generic,
    PortKind::Sheep,
    PortKind::Generic,
    PortKind::Wheat,
    PortKind::Ore,
];

/// Structural problems with a layout. These are configuration bugs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("layout has {actual} resources, expected {expected}")]
    ResourceCountMismatch { expected: usize, actual: usize },

    #[error("layout has {actual} tokens, expected {expected}")]
    TokenCountMismatch { expected: usize, actual: usize },

    #[error("hex {index} must be the desert")]
    DesertNotAtCenter { index: usize },

    #[error("desert hex {index} must not carry a token")]
    DesertHasToken { index: usize },

    #[error("layout must contain exactly one desert, found {0}")]
    DesertCount(usize),

    #[error("a seed is required for the random-balanced preset")]
    MissingSeed,

    #[error("could not assign number tokens for seed {0:?}")]
    TokenAssignmentFailed(String),
}

/// What a hex produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terrain {
    Wood,
    Brick,
    Sheep,
    Wheat,
    Ore,
    Desert,
}

impl Terrain {
    pub fn resource(&self) -> Option<Resource> {
        match self {
            Terrain::Wood => Some(Resource::Wood),
            Terrain::Brick => Some(Resource::Brick),
            Terrain::Sheep => Some(Resource::Sheep),
            Terrain::Wheat => Some(Resource::Wheat),
            Terrain::Ore => Some(Resource::Ore),
            Terrain::Desert => None,
        }
    }
}

impl From<Resource> for Terrain {
    fn from(resource: Resource) -> Self {
        match resource {
            Resource::Wood => Terrain::Wood,
            Resource::Brick => Terrain::Brick,
            Resource::Sheep => Terrain::Sheep,
            Resource::Wheat => Terrain::Wheat,
            Resource::Ore => Terrain::Ore,
        }
    }
}

/// Maritime trade bonus bound to one coastal edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortKind {
    /// 3:1 trade any resource
    Generic,
    Wood,
    Brick,
    Sheep,
    Wheat,
    Ore,
}

impl PortKind {
    /// The resource a specific port trades at 2:1, `None` for generic ports
    pub fn resource(&self) -> Option<Resource> {
        match self {
            PortKind::Generic => None,
            PortKind::Wood => Some(Resource::Wood),
            PortKind::Brick => Some(Resource::Brick),
            PortKind::Sheep => Some(Resource::Sheep),
            PortKind::Wheat => Some(Resource::Wheat),
            PortKind::Ore => Some(Resource::Ore),
        }
    }

    pub fn ratio(&self) -> u32 {
        match self {
            PortKind::Generic => 3,
            _ => 2,
        }
    }
}

/// The resource/token arrangement a board is built from.
///
/// Both vectors are indexed by hex position in sorted coordinate order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutSpec {
    pub resources: Vec<Terrain>,
    pub tokens: Vec<Option<u8>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hex {
    pub id: String,
    pub q: i32,
    pub r: i32,
    pub center: Point,
    pub resource: Terrain,
    pub token: Option<u8>,
    /// Clockwise from the top corner
    pub corner_vertex_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vertex {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub adjacent_hex_ids: Vec<String>,
    pub neighbor_vertex_ids: Vec<String>,
    pub edge_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    #[serde(rename = "vA")]
    pub v_a: String,
    #[serde(rename = "vB")]
    pub v_b: String,
}

impl Edge {
    pub fn endpoints(&self) -> [&str; 2] {
        [self.v_a.as_str(), self.v_b.as_str()]
    }

    pub fn touches(&self, vertex_id: &str) -> bool {
        self.v_a == vertex_id || self.v_b == vertex_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    pub id: String,
    pub kind: PortKind,
    pub ratio: u32,
    pub edge_id: String,
    pub vertex_ids: [String; 2],
    pub adjacent_hex_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

/// The complete, immutable board graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub layout: String,
    pub hex_size: f64,
    pub hexes: Vec<Hex>,
    pub vertices: Vec<Vertex>,
    pub edges: Vec<Edge>,
    pub ports: Vec<Port>,
    /// `"{a}|{b}"` with `a < b` to edge id
    pub edge_by_vertex_pair: BTreeMap<String, String>,
    pub bounds: Bounds,
}

fn pair_key(a: &str, b: &str) -> String {
    if a < b {
        format!("{a}|{b}")
    } else {
        format!("{b}|{a}")
    }
}

/// Parse the numeric part of a `V{n}`/`E{n}`/`H{n}` id.
fn index_of(id: &str, prefix: char) -> Option<usize> {
    id.strip_prefix(prefix)?.parse().ok()
}

/// Build the board graph for a layout.
///
/// Deterministic: the same layout always yields the same ids and geometry.
pub fn generate(layout: &LayoutSpec) -> Result<Board, BoardError> {
    let coords = board_coords(BOARD_RADIUS);
    if layout.resources.len() != coords.len() {
        return Err(BoardError::ResourceCountMismatch {
            expected: coords.len(),
            actual: layout.resources.len(),
        });
    }
    if layout.tokens.len() != coords.len() {
        return Err(BoardError::TokenCountMismatch {
            expected: coords.len(),
            actual: layout.tokens.len(),
        });
    }

    let offsets = corner_offsets(HEX_SIZE);
    let mut vertex_by_key: HashMap<(i64, i64), usize> = HashMap::new();
    let mut vertices: Vec<Vertex> = Vec::new();
    let mut edge_by_vertex_pair: BTreeMap<String, String> = BTreeMap::new();
    let mut edges: Vec<Edge> = Vec::new();
    let mut hexes = Vec::with_capacity(coords.len());

    for (idx, coord) in coords.iter().enumerate() {
        let center = coord.to_pixel(HEX_SIZE);
        let hex_id = format!("H{idx}");

        let mut corners = Vec::with_capacity(6);
        for off in &offsets {
            let pt = Point::new(center.x + off.x, center.y + off.y);
            let vi = *vertex_by_key.entry(pt.key()).or_insert_with(|| {
                vertices.push(Vertex {
                    id: format!("V{}", vertices.len()),
                    x: pt.x,
                    y: pt.y,
                    adjacent_hex_ids: Vec::new(),
                    neighbor_vertex_ids: Vec::new(),
                    edge_ids: Vec::new(),
                });
                vertices.len() - 1
            });
            vertices[vi].adjacent_hex_ids.push(hex_id.clone());
            corners.push(vertices[vi].id.clone());
        }

        for i in 0..corners.len() {
            let (a, b) = (&corners[i], &corners[(i + 1) % corners.len()]);
            let (a, b) = if a < b { (a, b) } else { (b, a) };
            let key = pair_key(a, b);
            if !edge_by_vertex_pair.contains_key(&key) {
                let id = format!("E{}", edges.len());
                edges.push(Edge {
                    id: id.clone(),
                    v_a: a.clone(),
                    v_b: b.clone(),
                });
                edge_by_vertex_pair.insert(key, id);
            }
        }

        hexes.push(Hex {
            id: hex_id,
            q: coord.q,
            r: coord.r,
            center,
            resource: layout.resources[idx],
            token: layout.tokens[idx],
            corner_vertex_ids: corners,
        });
    }

    for edge in &edges {
        let (Some(a), Some(b)) = (index_of(&edge.v_a, 'V'), index_of(&edge.v_b, 'V')) else {
            continue;
        };
        vertices[a].neighbor_vertex_ids.push(edge.v_b.clone());
        vertices[b].neighbor_vertex_ids.push(edge.v_a.clone());
        vertices[a].edge_ids.push(edge.id.clone());
        vertices[b].edge_ids.push(edge.id.clone());
    }

    let mut bounds = Bounds {
        min_x: f64::INFINITY,
        min_y: f64::INFINITY,
        max_x: f64::NEG_INFINITY,
        max_y: f64::NEG_INFINITY,
    };
    for v in &vertices {
        bounds.min_x = bounds.min_x.min(v.x);
        bounds.max_x = bounds.max_x.max(v.x);
        bounds.min_y = bounds.min_y.min(v.y);
        bounds.max_y = bounds.max_y.max(v.y);
    }

    let ports = place_ports(&hexes, &vertices, &edges, &edge_by_vertex_pair, &bounds);

    Ok(Board {
        layout: "standard-radius-2".to_string(),
        hex_size: HEX_SIZE,
        hexes,
        vertices,
        edges,
        ports,
        edge_by_vertex_pair,
        bounds,
    })
}

/// Deal the port kinds onto evenly spaced coastal edges, walking the coast
/// by angle around the board center.
fn place_ports(
    hexes: &[Hex],
    vertices: &[Vertex],
    edges: &[Edge],
    edge_by_vertex_pair: &BTreeMap<String, String>,
    bounds: &Bounds,
) -> Vec<Port> {
    let mut adjacent_hexes: HashMap<&str, Vec<&str>> = HashMap::new();
    for hex in hexes {
        let vs = &hex.corner_vertex_ids;
        for i in 0..vs.len() {
            let key = pair_key(&vs[i], &vs[(i + 1) % vs.len()]);
            if let Some(edge_id) = edge_by_vertex_pair.get(&key) {
                adjacent_hexes.entry(edge_id.as_str()).or_default().push(hex.id.as_str());
            }
        }
    }

    let center_x = (bounds.min_x + bounds.max_x) / 2.0;
    let center_y = (bounds.min_y + bounds.max_y) / 2.0;

    struct Coastal<'a> {
        edge: &'a Edge,
        hex_id: &'a str,
        angle: f64,
    }

    let mut coastal: Vec<Coastal<'_>> = edges
        .iter()
        .filter_map(|edge| {
            let adj = adjacent_hexes.get(edge.id.as_str())?;
            if adj.len() != 1 {
                return None;
            }
            let a = &vertices[index_of(&edge.v_a, 'V')?];
            let b = &vertices[index_of(&edge.v_b, 'V')?];
            let mid = Point::new(a.x, a.y).midpoint(&Point::new(b.x, b.y));
            Some(Coastal {
                edge,
                hex_id: adj[0],
                angle: (mid.y - center_y).atan2(mid.x - center_x),
            })
        })
        .collect();
    coastal.sort_by(|a, b| {
        a.angle
            .total_cmp(&b.angle)
            .then_with(|| a.edge.id.cmp(&b.edge.id))
    });

    let port_count = PORT_KINDS.len().min(coastal.len());
    if port_count == 0 {
        return Vec::new();
    }
    let step = coastal.len() as f64 / port_count as f64;

    PORT_KINDS
        .iter()
        .take(port_count)
        .enumerate()
        .map(|(i, kind)| {
            let idx = ((i as f64 + 0.5) * step).floor() as usize;
            let chosen = &coastal[idx.min(coastal.len() - 1)];
            Port {
                id: format!("P{i}"),
                kind: *kind,
                ratio: kind.ratio(),
                edge_id: chosen.edge.id.clone(),
                vertex_ids: [chosen.edge.v_a.clone(), chosen.edge.v_b.clone()],
                adjacent_hex_id: chosen.hex_id.to_string(),
            }
        })
        .collect()
}

impl Board {
    pub fn hex(&self, id: &str) -> Option<&Hex> {
        self.hexes.get(index_of(id, 'H')?).filter(|h| h.id == id)
    }

    pub fn vertex(&self, id: &str) -> Option<&Vertex> {
        self.vertices.get(index_of(id, 'V')?).filter(|v| v.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.get(index_of(id, 'E')?).filter(|e| e.id == id)
    }

    /// Dense index of a vertex, for algorithms that want arrays
    pub fn vertex_index(&self, id: &str) -> Option<usize> {
        self.vertex(id).and(index_of(id, 'V'))
    }

    pub fn edge_between(&self, a: &str, b: &str) -> Option<&str> {
        self.edge_by_vertex_pair.get(&pair_key(a, b)).map(String::as_str)
    }

    pub fn desert_hex_id(&self) -> Option<&str> {
        self.hexes
            .iter()
            .find(|h| h.resource == Terrain::Desert)
            .map(|h| h.id.as_str())
    }

    /// Ports a player would own by holding `vertex_id`
    pub fn ports_at(&self, vertex_id: &str) -> impl Iterator<Item = &Port> + '_ {
        let vertex_id = vertex_id.to_string();
        self.ports
            .iter()
            .filter(move |p| p.vertex_ids.iter().any(|v| *v == vertex_id))
    }
}
