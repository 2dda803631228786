use crate::error::MeshMapError;
use crate::geo::LatLng;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub type NodeId = String;
pub type LinkId = String;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    /// Strictly inside (-90, 90) x (-180, 180).
    pub fn is_valid(&self) -> bool {
        self.latitude.abs() < 90.0 && self.longitude.abs() < 180.0
    }

    pub fn lat_lng(&self) -> LatLng {
        LatLng::new(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbour {
    pub node_id: NodeId,
    #[serde(default)]
    pub link_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub node_id: NodeId,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub clients: u32,
    #[serde(default)]
    pub clients_wifi24: u32,
    #[serde(default)]
    pub clients_wifi5: u32,
    #[serde(default)]
    pub clients_other: u32,
    #[serde(default)]
    pub lastseen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub neighbours: Vec<Neighbour>,
}

impl Node {
    pub fn new(node_id: &str, hostname: &str) -> Self {
        Self {
            node_id: node_id.to_string(),
            hostname: hostname.to_string(),
            location: None,
            is_online: false,
            clients: 0,
            clients_wifi24: 0,
            clients_wifi5: 0,
            clients_other: 0,
            lastseen: None,
            neighbours: Vec::new(),
        }
    }

    /// Position of a node whose location lies inside the valid range.
    pub fn position(&self) -> Option<LatLng> {
        self.location
            .filter(Location::is_valid)
            .map(|location| location.lat_lng())
    }

    pub fn has_location(&self) -> bool {
        self.position().is_some()
    }

    /// A node with a VPN neighbour link has an uplink.
    pub fn has_uplink(&self) -> bool {
        self.neighbours
            .iter()
            .any(|neighbour| neighbour.link_type == "vpn")
    }

    pub fn client_counts(&self) -> ClientCounts {
        ClientCounts {
            total: self.clients,
            wifi24: self.clients_wifi24,
            wifi5: self.clients_wifi5,
            other: self.clients_other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ClientCounts {
    pub total: u32,
    pub wifi24: u32,
    pub wifi5: u32,
    pub other: u32,
}

impl ClientCounts {
    /// Whether the per-band counts add up to the total. Mismatches are
    /// reported by the client layer but never corrected.
    pub fn is_consistent(&self) -> bool {
        u64::from(self.wifi24) + u64::from(self.wifi5) + u64::from(self.other)
            == u64::from(self.total)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    #[serde(rename = "type", default)]
    pub link_type: String,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default)]
    pub source_tq: f64,
    #[serde(default)]
    pub target_tq: f64,
    #[serde(default)]
    pub distance: Option<f64>,
}

impl Link {
    pub fn is_vpn(&self) -> bool {
        self.link_type.starts_with("vpn")
    }

    /// Mean of both directions' link quality.
    pub fn mean_tq(&self) -> f64 {
        (self.source_tq + self.target_tq) / 2.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSets {
    #[serde(default)]
    pub online: Vec<Node>,
    #[serde(default)]
    pub offline: Vec<Node>,
    #[serde(default)]
    pub new: Vec<Node>,
    #[serde(default)]
    pub lost: Vec<Node>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub nodes: NodeSets,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub now: Option<DateTime<Utc>>,
}

/// Display category of a node. New takes precedence over online and lost
/// over offline, so every node ends up in exactly one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeCategory {
    New,
    Lost,
    Online,
    Offline,
}

impl NodeCategory {
    /// Label priority order, which also decides contested space.
    pub const PRIORITY: [NodeCategory; 4] = [
        NodeCategory::New,
        NodeCategory::Lost,
        NodeCategory::Online,
        NodeCategory::Offline,
    ];
}

/// Located nodes split into their display categories.
#[derive(Debug, Clone, Default)]
pub struct GroupedNodes {
    pub new: Vec<Node>,
    pub lost: Vec<Node>,
    pub online: Vec<Node>,
    pub offline: Vec<Node>,
}

impl GroupedNodes {
    pub fn get(&self, category: NodeCategory) -> &[Node] {
        match category {
            NodeCategory::New => &self.new,
            NodeCategory::Lost => &self.lost,
            NodeCategory::Online => &self.online,
            NodeCategory::Offline => &self.offline,
        }
    }

    /// Nodes in label priority order, paired with their category.
    pub fn in_priority_order(&self) -> impl Iterator<Item = (NodeCategory, &Node)> {
        NodeCategory::PRIORITY
            .into_iter()
            .flat_map(move |category| self.get(category).iter().map(move |node| (category, node)))
    }

    pub fn len(&self) -> usize {
        self.new.len() + self.lost.len() + self.online.len() + self.offline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Nodes of `a` whose id does not appear in `b`.
pub fn subtract(a: &[Node], b: &[Node]) -> Vec<Node> {
    let ids: HashSet<&str> = b.iter().map(|node| node.node_id.as_str()).collect();
    a.iter()
        .filter(|node| !ids.contains(node.node_id.as_str()))
        .cloned()
        .collect()
}

impl Dataset {
    pub fn from_json(text: &str) -> Result<Self, MeshMapError> {
        serde_json::from_str(text).map_err(MeshMapError::Dataset)
    }

    pub fn grouped(&self) -> GroupedNodes {
        let located = |nodes: Vec<Node>| -> Vec<Node> {
            nodes.into_iter().filter(Node::has_location).collect()
        };
        GroupedNodes {
            new: located(self.nodes.new.clone()),
            lost: located(self.nodes.lost.clone()),
            online: located(subtract(&self.nodes.online, &self.nodes.new)),
            offline: located(subtract(&self.nodes.offline, &self.nodes.lost)),
        }
    }

    /// Online nodes with a valid location, the input of the client layer.
    /// Membership of the `online` list decides; the `is_online` flag is not
    /// consulted.
    pub fn online_located(&self) -> impl Iterator<Item = &Node> {
        self.nodes.online.iter().filter(|node| node.has_location())
    }

    pub fn node_dict(&self) -> HashMap<&str, &Node> {
        let mut dict = HashMap::new();
        for node in self
            .nodes
            .offline
            .iter()
            .chain(&self.nodes.lost)
            .chain(&self.nodes.online)
            .chain(&self.nodes.new)
        {
            dict.insert(node.node_id.as_str(), node);
        }
        dict
    }
}
