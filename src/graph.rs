//! Audio node graph context
//!
//! Models the platform audio graph the engine wires itself into: a node
//! arena (gains, channel splitters/mergers, sources, the destination) plus a
//! port-addressed edge set, a monotonic clock, and hardware discovery. The
//! router and the sidecars only ever add and remove their own nodes; the
//! context and its destination are supplied by the embedding player and
//! outlive every component built on top of them.
//!
//! Two constructors: `new()` probes the default output device via cpal for
//! sample rate and maximum channel count; `offline()` takes fixed values for
//! tests and headless hosts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use cpal::traits::{DeviceTrait, HostTrait};

/// Handle to a node owned by an [`AudioGraphContext`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// What a graph node is
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Gain stage with a fixed channel count
    Gain { gain: f32, channel_count: u16 },
    /// Fans one multi-channel input out to `outputs` mono ports
    ChannelSplitter { outputs: usize },
    /// Fans `inputs` mono ports back into one multi-channel output
    ChannelMerger { inputs: usize },
    /// Streaming source (backed by a media element)
    Source,
    /// One-shot decoded-buffer source; `offset` is the media time the
    /// buffer was started at, `started_at` the context time of the start
    BufferSource { offset: f64, started_at: f64 },
    /// The context's output bus
    Destination,
}

impl NodeKind {
    fn input_ports(&self) -> usize {
        match self {
            NodeKind::Source | NodeKind::BufferSource { .. } => 0,
            NodeKind::ChannelMerger { inputs } => *inputs,
            _ => 1,
        }
    }

    fn output_ports(&self) -> usize {
        match self {
            NodeKind::Destination => 0,
            NodeKind::ChannelSplitter { outputs } => *outputs,
            _ => 1,
        }
    }
}

/// A directed, port-addressed connection between two nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub from: NodeId,
    pub from_port: usize,
    pub to: NodeId,
    pub to_port: usize,
}

struct GraphState {
    nodes: HashMap<usize, NodeKind>,
    edges: Vec<Edge>,
    next_id: usize,
}

impl GraphState {
    fn add(&mut self, kind: NodeKind) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(id, kind);
        NodeId(id)
    }
}

/// Graph-level errors
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),
    #[error("port {port} out of range on node {node:?}")]
    PortOutOfRange { node: NodeId, port: usize },
    #[error("nodes are not connected")]
    NotConnected,
    #[error("no audio output device: {0}")]
    NoOutputDevice(String),
}

/// The shared audio graph
///
/// Cheap to share (`Arc`); all mutation goes through an interior lock, so
/// `&self` methods suffice everywhere.
pub struct AudioGraphContext {
    state: Mutex<GraphState>,
    destination: NodeId,
    sample_rate: u32,
    max_channels: u16,
    epoch: Instant,
}

impl AudioGraphContext {
    /// Create a context backed by the default output device
    pub fn new() -> Result<Arc<Self>, GraphError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| GraphError::NoOutputDevice("no default device".to_string()))?;
        let config = device
            .default_output_config()
            .map_err(|e| GraphError::NoOutputDevice(e.to_string()))?;

        Ok(Self::with_config(
            config.sample_rate().0,
            config.channels(),
        ))
    }

    /// Create a context with fixed parameters (no hardware access)
    pub fn offline(sample_rate: u32, max_channels: u16) -> Arc<Self> {
        Self::with_config(sample_rate, max_channels)
    }

    fn with_config(sample_rate: u32, max_channels: u16) -> Arc<Self> {
        let mut state = GraphState {
            nodes: HashMap::new(),
            edges: Vec::new(),
            next_id: 0,
        };
        let destination = state.add(NodeKind::Destination);

        Arc::new(Self {
            state: Mutex::new(state),
            destination,
            sample_rate,
            max_channels,
            epoch: Instant::now(),
        })
    }

    /// The context's output bus
    pub fn destination(&self) -> NodeId {
        self.destination
    }

    /// Output sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Maximum channel count of the output hardware
    pub fn max_channel_count(&self) -> u16 {
        self.max_channels
    }

    /// Seconds elapsed since the context was created
    pub fn current_time(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GraphState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ------------------------------------------------------------------
    // Node creation
    // ------------------------------------------------------------------

    /// Create a gain node
    pub fn create_gain(&self, gain: f32, channel_count: u16) -> NodeId {
        self.lock().add(NodeKind::Gain {
            gain,
            channel_count,
        })
    }

    /// Create a channel splitter with `outputs` mono output ports
    pub fn create_splitter(&self, outputs: usize) -> NodeId {
        self.lock().add(NodeKind::ChannelSplitter { outputs })
    }

    /// Create a channel merger with `inputs` mono input ports
    pub fn create_merger(&self, inputs: usize) -> NodeId {
        self.lock().add(NodeKind::ChannelMerger { inputs })
    }

    /// Create a streaming source node
    pub fn create_source(&self) -> NodeId {
        self.lock().add(NodeKind::Source)
    }

    /// Create a one-shot buffer source scheduled at the current context time
    pub fn create_buffer_source(&self, offset: f64) -> NodeId {
        let started_at = self.current_time();
        self.lock().add(NodeKind::BufferSource { offset, started_at })
    }

    /// Set the gain of a gain node
    pub fn set_gain(&self, node: NodeId, gain: f32) -> Result<(), GraphError> {
        let mut state = self.lock();
        match state.nodes.get_mut(&node.0) {
            Some(NodeKind::Gain { gain: g, .. }) => {
                *g = gain;
                Ok(())
            }
            Some(_) => Err(GraphError::PortOutOfRange { node, port: 0 }),
            None => Err(GraphError::UnknownNode(node)),
        }
    }

    /// Read back a gain node's gain (diagnostics and tests)
    pub fn gain(&self, node: NodeId) -> Option<f32> {
        match self.lock().nodes.get(&node.0) {
            Some(NodeKind::Gain { gain, .. }) => Some(*gain),
            _ => None,
        }
    }

    /// Timing of a buffer source node: (media offset, context start time)
    pub fn buffer_source_timing(&self, node: NodeId) -> Option<(f64, f64)> {
        match self.lock().nodes.get(&node.0) {
            Some(NodeKind::BufferSource { offset, started_at }) => Some((*offset, *started_at)),
            _ => None,
        }
    }

    /// Whether a node is still part of the graph
    pub fn node_exists(&self, node: NodeId) -> bool {
        self.lock().nodes.contains_key(&node.0)
    }

    // ------------------------------------------------------------------
    // Edges
    // ------------------------------------------------------------------

    /// Connect two nodes on their first ports
    pub fn connect(&self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
        self.connect_ports(from, 0, to, 0)
    }

    /// Connect an output port of `from` to an input port of `to`
    ///
    /// Connecting an already-connected pair of ports is a no-op.
    pub fn connect_ports(
        &self,
        from: NodeId,
        from_port: usize,
        to: NodeId,
        to_port: usize,
    ) -> Result<(), GraphError> {
        let mut state = self.lock();

        let from_kind = state
            .nodes
            .get(&from.0)
            .ok_or(GraphError::UnknownNode(from))?;
        if from_port >= from_kind.output_ports() {
            return Err(GraphError::PortOutOfRange {
                node: from,
                port: from_port,
            });
        }
        let to_kind = state.nodes.get(&to.0).ok_or(GraphError::UnknownNode(to))?;
        if to_port >= to_kind.input_ports() {
            return Err(GraphError::PortOutOfRange {
                node: to,
                port: to_port,
            });
        }

        let edge = Edge {
            from,
            from_port,
            to,
            to_port,
        };
        if !state.edges.contains(&edge) {
            state.edges.push(edge);
        }
        Ok(())
    }

    /// Disconnect two nodes on their first ports
    pub fn disconnect(&self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
        self.disconnect_ports(from, 0, to, 0)
    }

    /// Disconnect one specific edge
    pub fn disconnect_ports(
        &self,
        from: NodeId,
        from_port: usize,
        to: NodeId,
        to_port: usize,
    ) -> Result<(), GraphError> {
        let mut state = self.lock();
        let edge = Edge {
            from,
            from_port,
            to,
            to_port,
        };
        let before = state.edges.len();
        state.edges.retain(|e| *e != edge);
        if state.edges.len() == before {
            return Err(GraphError::NotConnected);
        }
        Ok(())
    }

    /// Remove every edge between two nodes, regardless of port
    pub fn disconnect_nodes(&self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
        let mut state = self.lock();
        let before = state.edges.len();
        state.edges.retain(|e| !(e.from == from && e.to == to));
        if state.edges.len() == before {
            return Err(GraphError::NotConnected);
        }
        Ok(())
    }

    /// Remove every edge touching a node
    pub fn disconnect_all(&self, node: NodeId) {
        let mut state = self.lock();
        state.edges.retain(|e| e.from != node && e.to != node);
    }

    /// Whether any edge exists between two nodes
    pub fn is_connected(&self, from: NodeId, to: NodeId) -> bool {
        self.lock()
            .edges
            .iter()
            .any(|e| e.from == from && e.to == to)
    }

    /// Whether one specific edge exists
    pub fn is_connected_ports(
        &self,
        from: NodeId,
        from_port: usize,
        to: NodeId,
        to_port: usize,
    ) -> bool {
        self.lock().edges.contains(&Edge {
            from,
            from_port,
            to,
            to_port,
        })
    }

    /// Number of edges in the graph (diagnostics and tests)
    pub fn edge_count(&self) -> usize {
        self.lock().edges.len()
    }

    /// Remove a node and every edge touching it
    ///
    /// Removing an unknown node is tolerated: teardown paths may race and
    /// try to remove the same node twice.
    pub fn remove_node(&self, node: NodeId) {
        let mut state = self.lock();
        if state.nodes.remove(&node.0).is_none() {
            log::debug!("remove_node: {:?} already removed", node);
            return;
        }
        state.edges.retain(|e| e.from != node && e.to != node);
    }
}
