//! Channel routing matrix
//!
//! `AudioRouter` owns a fixed-size splitter/merger pair, the full N-input x
//! M-output connection matrix, per-input solo/mute bookkeeping, and optional
//! per-route effect chains. It sits downstream of a per-track gain stage and
//! upstream of a caller-supplied output node; the audio context and output
//! are borrowed, never owned.
//!
//! Connection-matrix mutations land in the in-memory matrix before any
//! change event fires, so listeners always observe a consistent snapshot.
//! Bulk updates apply in order and emit exactly one aggregate event.

pub mod matrix;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use serde::{Deserialize, Serialize};

use crate::effects::graph::ChainResult;
use crate::effects::{
    AudioEffectsGraph, AudioEffectsGraphDef, EffectParam, EffectType, GraphInitState,
};
use crate::events::EventEmitter;
use crate::graph::{AudioGraphContext, NodeId};

pub use matrix::{
    default_outputs_number, default_routing, default_routing_for_input, ConnectionMatrix,
    InputSoloMuteState, RouteSelector, RoutingConnection, RoutingPath,
};

/// Router-level errors
///
/// Structural misuse is returned to the caller; environmental node failures
/// are absorbed and logged at debug level where they occur.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouterError {
    #[error("unknown routing path ({input}, {output})")]
    InvalidPath { input: usize, output: usize },
    #[error("effects graph on route ({input}, {output}) has not finished initializing")]
    EffectsNotReady { input: usize, output: usize },
    #[error("no solo/mute change has occurred yet")]
    NoSoloMuteState,
}

/// One route in a state snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRouteState {
    pub path: RoutingPath,
    pub connected: bool,
    pub effects_graph: Option<AudioEffectsGraphDef>,
}

/// Full router state snapshot, computable at any time without side effects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioRouterState {
    pub inputs_number: usize,
    pub outputs_number: usize,
    pub routing_routes: Vec<RoutingRouteState>,
    pub connections: Vec<RoutingConnection>,
    pub initial_routing: Vec<RoutingConnection>,
}

/// Filter for effect lookup and parameter updates
#[derive(Debug, Clone, Copy, Default)]
pub struct EffectsFilter {
    pub routes: RouteSelector,
    pub effect_type: Option<EffectType>,
}

/// One effect matched by [`AudioRouter::find_audio_effects`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioEffectInfo {
    pub path: RoutingPath,
    pub effect_type: EffectType,
    pub params: Vec<EffectParam>,
}

/// Completion signal for a batch effects assignment
///
/// The signal fires only once every route in the batch's selector has
/// finished initializing. Drive it with [`AudioRouter::poll_effects`] or
/// block with [`AudioRouter::wait_for_effects`].
pub struct EffectsBatch {
    id: u64,
    done: Receiver<()>,
}

impl EffectsBatch {
    /// The receiver that fires once the whole batch is ready
    pub fn completion(&self) -> &Receiver<()> {
        &self.done
    }
}

struct PendingInit {
    path: RoutingPath,
    rx: Receiver<ChainResult>,
    batch: u64,
}

struct BatchState {
    remaining: usize,
    done_tx: Sender<()>,
}

/// The N-input x M-output routing matrix with solo/mute and effect chains
pub struct AudioRouter {
    ctx: Arc<AudioGraphContext>,
    splitter: NodeId,
    merger: NodeId,
    /// Zero-gain sink keeping unused splitter outputs pulled; never
    /// user-visible, never removable while the router lives.
    silent_sink: NodeId,
    source: Option<NodeId>,
    matrix: ConnectionMatrix,
    initial: Vec<RoutingConnection>,
    solo_mute: Vec<InputSoloMuteState>,
    last_solo_mute: Option<usize>,
    effects: Vec<Option<AudioEffectsGraph>>,
    pending: Vec<PendingInit>,
    batches: HashMap<u64, BatchState>,
    next_batch_id: u64,
    changes: EventEmitter<AudioRouterState>,
    solo_mute_changes: EventEmitter<InputSoloMuteState>,
    destroyed: bool,
}

impl AudioRouter {
    /// Create a router with the default output-count policy
    /// (1 channel -> 1 output, 2-5 -> 2, 6+ -> 6)
    pub fn new(ctx: Arc<AudioGraphContext>, output: NodeId, inputs_number: usize) -> Self {
        Self::new_with_resolver(ctx, output, inputs_number, default_outputs_number)
    }

    /// Create a router, resolving the output count from the hardware's
    /// maximum channel count with a caller-supplied policy
    pub fn new_with_resolver(
        ctx: Arc<AudioGraphContext>,
        output: NodeId,
        inputs_number: usize,
        resolver: impl Fn(usize) -> usize,
    ) -> Self {
        let outputs_number = resolver(ctx.max_channel_count() as usize);

        let splitter = ctx.create_splitter(inputs_number);
        let merger = ctx.create_merger(outputs_number);
        if let Err(e) = ctx.connect(merger, output) {
            log::debug!("router merger connect failed: {}", e);
        }

        // Unused splitter outputs would starve the pipeline without a
        // consumer, so every output also feeds a zero-gain sink wired
        // straight to the destination.
        let silent_sink = ctx.create_gain(0.0, 1);
        for port in 0..inputs_number {
            if let Err(e) = ctx.connect_ports(splitter, port, silent_sink, 0) {
                log::debug!("silent sink connect failed: {}", e);
            }
        }
        if let Err(e) = ctx.connect(silent_sink, ctx.destination()) {
            log::debug!("silent sink destination connect failed: {}", e);
        }

        let matrix = ConnectionMatrix::new(inputs_number, outputs_number);
        let initial = default_routing(inputs_number, outputs_number);
        let solo_mute = (0..inputs_number).map(InputSoloMuteState::new).collect();
        let effects = (0..inputs_number * outputs_number).map(|_| None).collect();

        let mut router = Self {
            ctx,
            splitter,
            merger,
            silent_sink,
            source: None,
            matrix,
            initial: initial.clone(),
            solo_mute,
            last_solo_mute: None,
            effects,
            pending: Vec::new(),
            batches: HashMap::new(),
            next_batch_id: 0,
            changes: EventEmitter::new(),
            solo_mute_changes: EventEmitter::new(),
            destroyed: false,
        };

        for conn in &initial {
            router.update_connection(*conn);
        }
        router
    }

    pub fn inputs_number(&self) -> usize {
        self.matrix.inputs()
    }

    pub fn outputs_number(&self) -> usize {
        self.matrix.outputs()
    }

    /// Subscribe to aggregate state changes
    pub fn subscribe_changes(&mut self) -> Receiver<AudioRouterState> {
        self.changes.subscribe()
    }

    /// Subscribe to per-input solo/mute changes
    pub fn subscribe_solo_mute_changes(&mut self) -> Receiver<InputSoloMuteState> {
        self.solo_mute_changes.subscribe()
    }

    // ------------------------------------------------------------------
    // Source wiring
    // ------------------------------------------------------------------

    /// Rewire the upstream source into the splitter, replacing any previous
    /// source
    pub fn connect_source(&mut self, node: NodeId) {
        self.disconnect_source();
        if let Err(e) = self.ctx.connect(node, self.splitter) {
            log::debug!("connect_source failed: {}", e);
            return;
        }
        self.source = Some(node);
    }

    /// The node currently wired into the splitter, if any
    pub fn source_node(&self) -> Option<NodeId> {
        self.source
    }

    /// Detach the upstream source (idempotent; already-disconnected nodes
    /// are tolerated)
    pub fn disconnect_source(&mut self) {
        if let Some(node) = self.source.take() {
            if let Err(e) = self.ctx.disconnect(node, self.splitter) {
                log::debug!("disconnect_source failed: {}", e);
            }
        }
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    /// Apply a batch of connection changes, then recompute solo/mute
    /// bookkeeping and emit one aggregate change event
    ///
    /// Out-of-range paths (e.g. stale entries from a previous router shape)
    /// are logged and skipped.
    pub fn update_connections(&mut self, connections: &[RoutingConnection]) {
        for conn in connections {
            self.update_connection(*conn);
        }
        self.refresh_solo_mute();
        self.emit_changes();
    }

    /// Apply one connection; physical rewiring happens only if the
    /// requested state differs from the recorded matrix state
    fn update_connection(&mut self, conn: RoutingConnection) -> bool {
        let Some(current) = self.matrix.get(conn.path) else {
            log::warn!(
                "skipping unknown routing path ({}, {})",
                conn.path.input,
                conn.path.output
            );
            return false;
        };
        if current.connected == conn.connected {
            return false;
        }
        if conn.connected {
            // A chain mid-initialization has no processors yet; wiring
            // audio through it would run an empty graph. The route stays
            // disconnected until the caller retries after completion.
            if let Some(idx) = self.matrix.index(conn.path) {
                if self.effects[idx].as_ref().is_some_and(|g| !g.is_initialized()) {
                    log::warn!(
                        "route ({}, {}) has an initializing effects chain, skipping connect",
                        conn.path.input,
                        conn.path.output
                    );
                    return false;
                }
            }
            self.wire_route(conn.path);
        } else {
            self.unwire_route(conn.path);
        }
        self.matrix.set_connected(conn.path, conn.connected);
        true
    }

    fn wire_route(&self, path: RoutingPath) {
        let Some(idx) = self.matrix.index(path) else {
            return;
        };
        let result = if let Some(graph) = &self.effects[idx] {
            self.ctx
                .connect_ports(self.splitter, path.input, graph.input(), 0)
                .and_then(|_| {
                    self.ctx
                        .connect_ports(graph.output(), 0, self.merger, path.output)
                })
        } else {
            self.ctx
                .connect_ports(self.splitter, path.input, self.merger, path.output)
        };
        if let Err(e) = result {
            log::debug!("route ({}, {}) connect failed: {}", path.input, path.output, e);
        }
    }

    fn unwire_route(&self, path: RoutingPath) {
        let Some(idx) = self.matrix.index(path) else {
            return;
        };
        let result = if let Some(graph) = &self.effects[idx] {
            self.ctx
                .disconnect_ports(self.splitter, path.input, graph.input(), 0)
                .and_then(|_| {
                    self.ctx
                        .disconnect_ports(graph.output(), 0, self.merger, path.output)
                })
        } else {
            self.ctx
                .disconnect_ports(self.splitter, path.input, self.merger, path.output)
        };
        if let Err(e) = result {
            log::debug!(
                "route ({}, {}) disconnect failed: {}",
                path.input,
                path.output,
                e
            );
        }
    }

    /// External connection changes can retroactively mute or unmute an
    /// input; re-derive the flags from live connection counts
    fn refresh_solo_mute(&mut self) {
        for input in 0..self.matrix.inputs() {
            if self.solo_mute[input].soloed {
                continue;
            }
            self.solo_mute[input].muted = self.matrix.live_count(input) == 0;
        }
    }

    // ------------------------------------------------------------------
    // Initial routing table
    // ------------------------------------------------------------------

    pub fn get_initial_routing_connections(&self) -> &[RoutingConnection] {
        &self.initial
    }

    /// Replace the initial routing table
    ///
    /// Rejected with a logged error (table left unchanged) if the length
    /// does not equal `inputs_number * outputs_number`.
    pub fn set_initial_routing_connections(&mut self, connections: &[RoutingConnection]) {
        let expected = self.matrix.inputs() * self.matrix.outputs();
        if connections.len() != expected {
            log::error!(
                "initial routing table length {} != {}; keeping previous table",
                connections.len(),
                expected
            );
            return;
        }
        self.initial = connections.to_vec();
    }

    /// Initial-routing entries of one input that are marked connected
    fn initial_connected_row(&self, input: usize) -> Vec<RoutingConnection> {
        self.initial
            .iter()
            .filter(|c| c.path.input == input && c.connected)
            .copied()
            .collect()
    }

    // ------------------------------------------------------------------
    // Solo / mute
    // ------------------------------------------------------------------

    fn soloed_input(&self) -> Option<usize> {
        self.solo_mute.iter().position(|s| s.soloed)
    }

    /// Toggle exclusive solo on a path's input
    pub fn toggle_solo(&mut self, path: RoutingPath) -> Result<(), RouterError> {
        let input = path.input;
        if input >= self.matrix.inputs() {
            return Err(RouterError::InvalidPath {
                input,
                output: path.output,
            });
        }

        if self.solo_mute[input].soloed {
            self.unsolo(input, true);
        } else {
            // Only one input may be soloed; clear the previous holder
            // without re-emitting.
            if let Some(other) = self.soloed_input() {
                self.unsolo(other, false);
            }
            self.solo_input(input);
        }

        self.last_solo_mute = Some(input);
        self.emit_solo_mute(input);
        self.emit_changes();
        Ok(())
    }

    fn solo_input(&mut self, input: usize) {
        // Connections to bring live, in priority order: current live set,
        // remembered muted set, connected initial-routing entries, freshly
        // computed default.
        let live = self.matrix.connected_row(input);
        let candidates: Vec<RoutingConnection> = if !live.is_empty() {
            live
        } else if !self.solo_mute[input].input_muted_connections.is_empty() {
            self.solo_mute[input].input_muted_connections.clone()
        } else {
            let initial = self.initial_connected_row(input);
            if !initial.is_empty() {
                initial
            } else {
                default_routing_for_input(input, self.matrix.inputs(), self.matrix.outputs())
                    .into_iter()
                    .filter(|c| c.connected)
                    .collect()
            }
        };

        // Snapshot every other input's live connections for restoration,
        // then silence them without destroying their remembered state.
        let mut others_live = Vec::new();
        for i in 0..self.matrix.inputs() {
            if i != input {
                others_live.extend(self.matrix.connected_row(i));
            }
        }
        for conn in &others_live {
            self.update_connection(RoutingConnection {
                path: conn.path,
                connected: false,
            });
        }
        for conn in &candidates {
            self.update_connection(RoutingConnection {
                path: conn.path,
                connected: true,
            });
        }

        for i in 0..self.matrix.inputs() {
            if i != input {
                let state = &mut self.solo_mute[i];
                state.soloed = false;
                state.muted = true;
                state.unsolo_connections.clear();
            }
        }

        let state = &mut self.solo_mute[input];
        state.soloed = true;
        state.muted = false;
        state.input_soloed_connections = candidates
            .iter()
            .map(|c| RoutingConnection {
                path: c.path,
                connected: true,
            })
            .collect();
        state.unsolo_connections = others_live;
    }

    fn unsolo(&mut self, input: usize, check_mute: bool) {
        let restore = if !self.solo_mute[input].unsolo_connections.is_empty() {
            self.solo_mute[input].unsolo_connections.clone()
        } else {
            self.initial_connected_row(input)
        };
        for conn in &restore {
            self.update_connection(RoutingConnection {
                path: conn.path,
                connected: true,
            });
        }

        if check_mute {
            for i in 0..self.matrix.inputs() {
                self.solo_mute[i].muted = self.matrix.live_count(i) == 0;
            }
        }

        let state = &mut self.solo_mute[input];
        state.soloed = false;
        state.muted = false;
        state.unsolo_connections.clear();
        state.input_soloed_connections.clear();
    }

    /// Toggle mute on a path's input
    ///
    /// If any input is currently soloed, the solo is cleared first and the
    /// mute applies against the restored state. Muting the soloed input
    /// itself unsolos it and then mutes it unconditionally.
    pub fn toggle_mute(&mut self, path: RoutingPath) -> Result<(), RouterError> {
        let input = path.input;
        if input >= self.matrix.inputs() {
            return Err(RouterError::InvalidPath {
                input,
                output: path.output,
            });
        }

        if let Some(soloed) = self.soloed_input() {
            self.unsolo(soloed, true);
            if soloed == input {
                self.mute_input(input);
            } else if self.solo_mute[input].muted {
                self.unmute_input(input);
            } else {
                self.mute_input(input);
            }
        } else if self.solo_mute[input].muted {
            self.unmute_input(input);
        } else {
            self.mute_input(input);
        }

        self.last_solo_mute = Some(input);
        self.emit_solo_mute(input);
        self.emit_changes();
        Ok(())
    }

    fn mute_input(&mut self, input: usize) {
        let live = self.matrix.connected_row(input);
        // With zero live connections the previously remembered set is kept
        // so a later unmute still has something to restore.
        let remembered = if live.is_empty() {
            self.solo_mute[input].input_muted_connections.clone()
        } else {
            live.clone()
        };
        for conn in &live {
            self.update_connection(RoutingConnection {
                path: conn.path,
                connected: false,
            });
        }
        let state = &mut self.solo_mute[input];
        state.input_muted_connections = remembered;
        state.muted = true;
        state.soloed = false;
    }

    fn unmute_input(&mut self, input: usize) {
        let restore = if !self.solo_mute[input].input_muted_connections.is_empty() {
            self.solo_mute[input].input_muted_connections.clone()
        } else {
            let initial = self.initial_connected_row(input);
            if !initial.is_empty() {
                initial
            } else {
                default_routing_for_input(input, self.matrix.inputs(), self.matrix.outputs())
                    .into_iter()
                    .filter(|c| c.connected)
                    .collect()
            }
        };
        for conn in &restore {
            self.update_connection(RoutingConnection {
                path: conn.path,
                connected: true,
            });
        }
        let state = &mut self.solo_mute[input];
        state.muted = false;
        state.input_muted_connections.clear();
    }

    /// The most recent per-input solo/mute state
    ///
    /// Errors if no solo/mute change has ever occurred.
    pub fn input_solo_mute_state(&self) -> Result<InputSoloMuteState, RouterError> {
        self.last_solo_mute
            .map(|i| self.solo_mute[i].clone())
            .ok_or(RouterError::NoSoloMuteState)
    }

    /// Solo/mute record of one input (always defined once constructed)
    pub fn solo_mute_state(&self, input: usize) -> Option<&InputSoloMuteState> {
        self.solo_mute.get(input)
    }

    // ------------------------------------------------------------------
    // Effects graphs
    // ------------------------------------------------------------------

    fn select_paths(&self, selector: RouteSelector) -> Result<Vec<RoutingPath>, RouterError> {
        if let Some(input) = selector.input {
            if input >= self.matrix.inputs() {
                return Err(RouterError::InvalidPath {
                    input,
                    output: selector.output.unwrap_or(0),
                });
            }
        }
        if let Some(output) = selector.output {
            if output >= self.matrix.outputs() {
                return Err(RouterError::InvalidPath {
                    input: selector.input.unwrap_or(0),
                    output,
                });
            }
        }
        Ok(self
            .matrix
            .cells()
            .iter()
            .map(|c| c.path)
            .filter(|p| selector.matches(*p))
            .collect())
    }

    fn ensure_ready(&self, paths: &[RoutingPath]) -> Result<(), RouterError> {
        for path in paths {
            let Some(idx) = self.matrix.index(*path) else {
                continue;
            };
            // Only a chain still mid-initialization blocks the call; a
            // failed chain is gone by the time poll_effects reports it.
            if let Some(graph) = &self.effects[idx] {
                if matches!(graph.init_state(), GraphInitState::Initializing) {
                    return Err(RouterError::EffectsNotReady {
                        input: path.input,
                        output: path.output,
                    });
                }
            }
        }
        Ok(())
    }

    /// Assign an effects graph to every route matched by the selector
    ///
    /// Any targeted route whose current graph is still initializing fails
    /// the whole call. Replaced graphs are destroyed wholesale; connected
    /// routes stay unwired until their new chain is ready and are then
    /// rewired through it. A chain that fails to initialize is discarded
    /// and its route falls back to a bare wire. The returned batch
    /// completes only once every targeted route finished initializing, at
    /// which point one aggregate change event fires.
    pub fn set_audio_effects_graphs(
        &mut self,
        def: &AudioEffectsGraphDef,
        selector: RouteSelector,
    ) -> Result<EffectsBatch, RouterError> {
        let targets = self.select_paths(selector)?;
        self.ensure_ready(&targets)?;

        let batch_id = self.next_batch_id;
        self.next_batch_id += 1;
        let (done_tx, done_rx) = bounded(1);

        for path in &targets {
            let Some(idx) = self.matrix.index(*path) else {
                continue;
            };
            let connected = self.matrix.get(*path).is_some_and(|c| c.connected);
            if connected {
                self.unwire_route(*path);
            }
            if let Some(mut old) = self.effects[idx].take() {
                old.destroy(&self.ctx);
            }
            let (graph, rx) = AudioEffectsGraph::begin(&self.ctx, def.clone());
            self.effects[idx] = Some(graph);
            self.pending.push(PendingInit {
                path: *path,
                rx,
                batch: batch_id,
            });
        }

        if targets.is_empty() {
            let _ = done_tx.send(());
        } else {
            self.batches.insert(
                batch_id,
                BatchState {
                    remaining: targets.len(),
                    done_tx,
                },
            );
        }

        Ok(EffectsBatch {
            id: batch_id,
            done: done_rx,
        })
    }

    /// Drain finished chain initializations, rewiring connected routes
    /// through their graphs and resolving completed batches
    pub fn poll_effects(&mut self) {
        let mut finished = Vec::new();
        let mut i = 0;
        while i < self.pending.len() {
            match self.pending[i].rx.try_recv() {
                Ok(result) => {
                    let p = self.pending.remove(i);
                    finished.push((p, result));
                }
                Err(TryRecvError::Empty) => i += 1,
                Err(TryRecvError::Disconnected) => {
                    let p = self.pending.remove(i);
                    finished.push((p, Err("initialization worker terminated".to_string())));
                }
            }
        }

        for (p, result) in finished {
            if let Some(idx) = self.matrix.index(p.path) {
                let failed = result.is_err();
                if let Some(graph) = self.effects[idx].as_mut() {
                    graph.complete(result);
                }
                // A failed chain is discarded so the route falls back to a
                // bare wire and the slot accepts a fresh assignment.
                if failed {
                    log::warn!(
                        "effects chain on route ({}, {}) failed to initialize, removing it",
                        p.path.input,
                        p.path.output
                    );
                    if let Some(mut graph) = self.effects[idx].take() {
                        graph.destroy(&self.ctx);
                    }
                }
                let connected = self.matrix.get(p.path).is_some_and(|c| c.connected);
                if connected {
                    self.wire_route(p.path);
                }
            }
            let batch_done = match self.batches.get_mut(&p.batch) {
                Some(batch) => {
                    batch.remaining -= 1;
                    batch.remaining == 0
                }
                None => false,
            };
            if batch_done {
                if let Some(batch) = self.batches.remove(&p.batch) {
                    let _ = batch.done_tx.send(());
                }
                self.emit_changes();
            }
        }
    }

    /// Block until a batch assignment is fully initialized
    pub fn wait_for_effects(&mut self, batch: &EffectsBatch) {
        while self.batches.contains_key(&batch.id) {
            self.poll_effects();
            if self.batches.contains_key(&batch.id) {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }

    /// Remove the effects graphs of every matched route, restoring bare
    /// splitter-to-merger wires on connected routes
    pub fn remove_audio_effects_graphs(
        &mut self,
        selector: RouteSelector,
    ) -> Result<(), RouterError> {
        let targets = self.select_paths(selector)?;
        self.ensure_ready(&targets)?;

        for path in &targets {
            let Some(idx) = self.matrix.index(*path) else {
                continue;
            };
            if self.effects[idx].is_none() {
                continue;
            }
            let connected = self.matrix.get(*path).is_some_and(|c| c.connected);
            if connected {
                self.unwire_route(*path);
            }
            if let Some(mut graph) = self.effects[idx].take() {
                graph.destroy(&self.ctx);
            }
            if connected {
                self.wire_route(*path);
            }
        }
        self.emit_changes();
        Ok(())
    }

    /// Serialized definitions of the matched routes' graphs
    pub fn find_audio_effects_graphs(
        &self,
        selector: RouteSelector,
    ) -> Result<Vec<(RoutingPath, AudioEffectsGraphDef)>, RouterError> {
        let targets = self.select_paths(selector)?;
        Ok(targets
            .into_iter()
            .filter_map(|path| {
                let idx = self.matrix.index(path)?;
                self.effects[idx]
                    .as_ref()
                    .map(|g| (path, g.serialize_def()))
            })
            .collect())
    }

    /// Enumerate individual effects across the matched routes
    pub fn find_audio_effects(
        &self,
        filter: &EffectsFilter,
    ) -> Result<Vec<AudioEffectInfo>, RouterError> {
        let targets = self.select_paths(filter.routes)?;
        let mut found = Vec::new();
        for path in targets {
            let Some(idx) = self.matrix.index(path) else {
                continue;
            };
            if let Some(graph) = &self.effects[idx] {
                for (effect_type, params) in graph.effects_info() {
                    if filter.effect_type.is_none_or(|t| t == effect_type) {
                        found.push(AudioEffectInfo {
                            path,
                            effect_type,
                            params,
                        });
                    }
                }
            }
        }
        Ok(found)
    }

    /// Apply a parameter to matching effects across the matched routes
    pub fn set_audio_effects_params(
        &mut self,
        param: EffectParam,
        filter: &EffectsFilter,
    ) -> Result<(), RouterError> {
        let targets = self.select_paths(filter.routes)?;
        self.ensure_ready(&targets)?;

        for path in targets {
            let Some(idx) = self.matrix.index(path) else {
                continue;
            };
            if let Some(graph) = self.effects[idx].as_mut() {
                if filter
                    .effect_type
                    .is_none_or(|t| t == param.id.effect_type())
                {
                    graph.set_param(param);
                }
            }
        }
        self.emit_changes();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Snapshots and teardown
    // ------------------------------------------------------------------

    /// Full state snapshot (no side effects)
    pub fn get_audio_router_state(&self) -> AudioRouterState {
        let routing_routes = self
            .matrix
            .cells()
            .iter()
            .map(|c| {
                let effects_graph = self
                    .matrix
                    .index(c.path)
                    .and_then(|idx| self.effects[idx].as_ref())
                    .map(|g| g.serialize_def());
                RoutingRouteState {
                    path: c.path,
                    connected: c.connected,
                    effects_graph,
                }
            })
            .collect();

        AudioRouterState {
            inputs_number: self.matrix.inputs(),
            outputs_number: self.matrix.outputs(),
            routing_routes,
            connections: self.matrix.cells().to_vec(),
            initial_routing: self.initial.clone(),
        }
    }

    fn emit_changes(&mut self) {
        let state = self.get_audio_router_state();
        self.changes.emit(state);
    }

    fn emit_solo_mute(&mut self, input: usize) {
        let state = self.solo_mute[input].clone();
        self.solo_mute_changes.emit(state);
    }

    /// Tear down: close emitters, destroy effect graphs, detach every
    /// owned node (already-disconnected nodes are tolerated)
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.changes.close();
        self.solo_mute_changes.close();
        self.pending.clear();
        self.batches.clear();
        for slot in &mut self.effects {
            if let Some(mut graph) = slot.take() {
                graph.destroy(&self.ctx);
            }
        }
        self.disconnect_source();
        self.ctx.remove_node(self.splitter);
        self.ctx.remove_node(self.merger);
        self.ctx.remove_node(self.silent_sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{EffectNodeDef, EffectParamId};

    fn make_router(inputs: usize, max_channels: u16) -> AudioRouter {
        let ctx = AudioGraphContext::offline(48000, max_channels);
        let output = ctx.destination();
        AudioRouter::new(ctx, output, inputs)
    }

    fn filter_def() -> AudioEffectsGraphDef {
        AudioEffectsGraphDef {
            effects: vec![EffectNodeDef {
                effect_type: EffectType::Filter,
                params: vec![],
            }],
        }
    }

    #[test]
    fn test_state_covers_every_pair_once() {
        let router = make_router(3, 2);
        let state = router.get_audio_router_state();
        assert_eq!(state.outputs_number, 2);
        assert_eq!(state.routing_routes.len(), 6);
        for input in 0..3 {
            for output in 0..2 {
                let count = state
                    .routing_routes
                    .iter()
                    .filter(|r| r.path == RoutingPath::new(input, output))
                    .count();
                assert_eq!(count, 1, "pair ({}, {})", input, output);
            }
        }
    }

    #[test]
    fn test_output_count_policy() {
        assert_eq!(make_router(2, 1).outputs_number(), 1);
        assert_eq!(make_router(2, 4).outputs_number(), 2);
        assert_eq!(make_router(6, 8).outputs_number(), 6);
    }

    #[test]
    fn test_default_routing_applied() {
        let router = make_router(2, 2);
        assert!(router
            .matrix
            .get(RoutingPath::new(0, 0))
            .unwrap()
            .connected);
        assert!(router
            .matrix
            .get(RoutingPath::new(1, 1))
            .unwrap()
            .connected);
        assert!(!router
            .matrix
            .get(RoutingPath::new(0, 1))
            .unwrap()
            .connected);
    }

    #[test]
    fn test_update_connections_idempotent() {
        let mut router = make_router(2, 2);
        let conns = vec![
            RoutingConnection::new(0, 1, true),
            RoutingConnection::new(1, 1, false),
        ];
        router.update_connections(&conns);
        let state_a = router.get_audio_router_state();
        let edges_a = router.ctx.edge_count();

        router.update_connections(&conns);
        let state_b = router.get_audio_router_state();
        let edges_b = router.ctx.edge_count();

        assert_eq!(state_a, state_b);
        assert_eq!(edges_a, edges_b);
    }

    #[test]
    fn test_update_connections_emits_one_aggregate_event() {
        let mut router = make_router(2, 2);
        let rx = router.subscribe_changes();
        router.update_connections(&[
            RoutingConnection::new(0, 1, true),
            RoutingConnection::new(1, 0, true),
        ]);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_bulk_update_skips_stale_paths() {
        let mut router = make_router(2, 2);
        router.update_connections(&[
            RoutingConnection::new(9, 9, true),
            RoutingConnection::new(0, 1, true),
        ]);
        assert!(router
            .matrix
            .get(RoutingPath::new(0, 1))
            .unwrap()
            .connected);
    }

    #[test]
    fn test_solo_scenario_two_by_two() {
        let mut router = make_router(2, 2);
        router.toggle_solo(RoutingPath::new(0, 0)).unwrap();

        assert!(router
            .matrix
            .get(RoutingPath::new(0, 0))
            .unwrap()
            .connected);
        assert!(!router
            .matrix
            .get(RoutingPath::new(1, 1))
            .unwrap()
            .connected);

        let state = router.input_solo_mute_state().unwrap();
        assert_eq!(state.input_number, 0);
        assert!(state.soloed);
        assert!(!state.muted);
    }

    #[test]
    fn test_solo_exclusivity() {
        let mut router = make_router(2, 2);
        router.toggle_solo(RoutingPath::new(0, 0)).unwrap();
        router.toggle_solo(RoutingPath::new(1, 0)).unwrap();

        assert!(!router.solo_mute_state(0).unwrap().soloed);
        assert!(router.solo_mute_state(1).unwrap().soloed);
        // Input 0's connections were restored from the snapshot, then
        // silenced again by the second solo.
        assert!(router.solo_mute_state(0).unwrap().muted);
        assert!(!router
            .matrix
            .get(RoutingPath::new(0, 0))
            .unwrap()
            .connected);
        assert!(router
            .matrix
            .get(RoutingPath::new(1, 1))
            .unwrap()
            .connected);
    }

    #[test]
    fn test_solo_round_trip_restores_everything() {
        let mut router = make_router(3, 6);
        let before: Vec<_> = router.matrix.cells().to_vec();

        router.toggle_solo(RoutingPath::new(1, 1)).unwrap();
        router.toggle_solo(RoutingPath::new(1, 1)).unwrap();

        assert_eq!(router.matrix.cells(), before.as_slice());
        for input in 0..3 {
            assert!(!router.solo_mute_state(input).unwrap().soloed);
            assert!(!router.solo_mute_state(input).unwrap().muted);
        }
    }

    #[test]
    fn test_mute_while_other_soloed_clears_solo_first() {
        let mut router = make_router(2, 2);
        router.toggle_solo(RoutingPath::new(0, 0)).unwrap();
        router.toggle_mute(RoutingPath::new(1, 1)).unwrap();

        assert!(!router.solo_mute_state(0).unwrap().soloed);
        assert!(router.solo_mute_state(1).unwrap().muted);
        // Input 0 was restored by the unsolo and stays live
        assert!(router
            .matrix
            .get(RoutingPath::new(0, 0))
            .unwrap()
            .connected);
        assert!(!router
            .matrix
            .get(RoutingPath::new(1, 1))
            .unwrap()
            .connected);
    }

    #[test]
    fn test_muting_the_soloed_input_unsolos_then_mutes() {
        let mut router = make_router(2, 2);
        router.toggle_solo(RoutingPath::new(0, 0)).unwrap();
        router.toggle_mute(RoutingPath::new(0, 0)).unwrap();

        let state = router.solo_mute_state(0).unwrap();
        assert!(!state.soloed);
        assert!(state.muted);
        assert!(!router
            .matrix
            .get(RoutingPath::new(0, 0))
            .unwrap()
            .connected);
        // The other input came back with the unsolo
        assert!(router
            .matrix
            .get(RoutingPath::new(1, 1))
            .unwrap()
            .connected);
    }

    #[test]
    fn test_mute_round_trip() {
        let mut router = make_router(2, 2);
        router.toggle_mute(RoutingPath::new(0, 0)).unwrap();
        assert!(!router
            .matrix
            .get(RoutingPath::new(0, 0))
            .unwrap()
            .connected);

        router.toggle_mute(RoutingPath::new(0, 0)).unwrap();
        assert!(router
            .matrix
            .get(RoutingPath::new(0, 0))
            .unwrap()
            .connected);
        assert!(!router.solo_mute_state(0).unwrap().muted);
    }

    #[test]
    fn test_invalid_path_is_error_for_solo_and_mute() {
        let mut router = make_router(2, 2);
        assert!(matches!(
            router.toggle_solo(RoutingPath::new(5, 0)),
            Err(RouterError::InvalidPath { input: 5, .. })
        ));
        assert!(matches!(
            router.toggle_mute(RoutingPath::new(9, 0)),
            Err(RouterError::InvalidPath { input: 9, .. })
        ));
    }

    #[test]
    fn test_solo_mute_state_errors_before_first_change() {
        let router = make_router(2, 2);
        assert_eq!(
            router.input_solo_mute_state(),
            Err(RouterError::NoSoloMuteState)
        );
    }

    #[test]
    fn test_initial_routing_length_check() {
        let mut router = make_router(2, 2);
        let before = router.get_initial_routing_connections().to_vec();
        router.set_initial_routing_connections(&[RoutingConnection::new(0, 0, true)]);
        assert_eq!(router.get_initial_routing_connections(), before.as_slice());

        let replacement: Vec<_> = (0..2)
            .flat_map(|i| (0..2).map(move |o| RoutingConnection::new(i, o, true)))
            .collect();
        router.set_initial_routing_connections(&replacement);
        assert_eq!(
            router.get_initial_routing_connections(),
            replacement.as_slice()
        );
    }

    #[test]
    fn test_effects_assignment_rewires_connected_route() {
        let mut router = make_router(2, 2);
        let batch = router
            .set_audio_effects_graphs(&filter_def(), RouteSelector::cell(0, 0))
            .unwrap();
        router.wait_for_effects(&batch);

        let state = router.get_audio_router_state();
        let route = state
            .routing_routes
            .iter()
            .find(|r| r.path == RoutingPath::new(0, 0))
            .unwrap();
        assert!(route.connected);
        let def = route.effects_graph.as_ref().unwrap();
        assert_eq!(def.effects.len(), 1);
        assert_eq!(def.effects[0].effect_type, EffectType::Filter);
    }

    #[test]
    fn test_effects_reassign_while_initializing_fails() {
        let mut router = make_router(2, 2);
        let _batch = router
            .set_audio_effects_graphs(&filter_def(), RouteSelector::cell(0, 0))
            .unwrap();
        // No poll in between: the first graph is still initializing
        assert!(matches!(
            router.set_audio_effects_graphs(&filter_def(), RouteSelector::cell(0, 0)),
            Err(RouterError::EffectsNotReady { input: 0, output: 0 })
        ));
    }

    #[test]
    fn test_connect_skipped_while_chain_initializing() {
        let mut router = make_router(2, 2);
        let batch = router
            .set_audio_effects_graphs(&filter_def(), RouteSelector::cell(0, 1))
            .unwrap();

        // The chain has not finished building; the connect must not land
        router.update_connections(&[RoutingConnection::new(0, 1, true)]);
        assert!(!router
            .matrix
            .get(RoutingPath::new(0, 1))
            .unwrap()
            .connected);

        router.wait_for_effects(&batch);
        router.update_connections(&[RoutingConnection::new(0, 1, true)]);
        assert!(router
            .matrix
            .get(RoutingPath::new(0, 1))
            .unwrap()
            .connected);
        // Wired through the chain's taps, not a bare edge
        assert!(!router
            .ctx
            .is_connected_ports(router.splitter, 0, router.merger, 1));
    }

    #[test]
    fn test_failed_chain_restores_bare_wire() {
        let mut router = make_router(2, 2);
        let batch = router
            .set_audio_effects_graphs(&filter_def(), RouteSelector::cell(0, 0))
            .unwrap();
        // Sever the completion channel so the initialization is reported
        // as a worker failure
        let (tx, rx) = bounded::<ChainResult>(1);
        drop(tx);
        router.pending[0].rx = rx;

        router.wait_for_effects(&batch);
        assert!(batch.completion().try_recv().is_ok());

        let state = router.get_audio_router_state();
        let route = state
            .routing_routes
            .iter()
            .find(|r| r.path == RoutingPath::new(0, 0))
            .unwrap();
        assert!(route.connected);
        assert!(route.effects_graph.is_none());
        assert!(router
            .ctx
            .is_connected_ports(router.splitter, 0, router.merger, 0));

        // The slot accepts a fresh assignment right away
        let batch = router
            .set_audio_effects_graphs(&filter_def(), RouteSelector::cell(0, 0))
            .unwrap();
        router.wait_for_effects(&batch);
        assert_eq!(
            router
                .find_audio_effects_graphs(RouteSelector::cell(0, 0))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_effects_batch_completion_signal() {
        let mut router = make_router(2, 2);
        let rx = router.subscribe_changes();
        let batch = router
            .set_audio_effects_graphs(&filter_def(), RouteSelector::all())
            .unwrap();
        assert!(rx.try_recv().is_err(), "no event before batch completes");

        router.wait_for_effects(&batch);
        assert!(batch.completion().try_recv().is_ok());
        assert!(rx.try_recv().is_ok(), "one aggregate event at completion");

        let graphs = router.find_audio_effects_graphs(RouteSelector::all()).unwrap();
        assert_eq!(graphs.len(), 4);
    }

    #[test]
    fn test_remove_effects_restores_bare_wire() {
        let mut router = make_router(2, 2);
        let batch = router
            .set_audio_effects_graphs(&filter_def(), RouteSelector::cell(0, 0))
            .unwrap();
        router.wait_for_effects(&batch);

        router
            .remove_audio_effects_graphs(RouteSelector::cell(0, 0))
            .unwrap();
        let state = router.get_audio_router_state();
        let route = state
            .routing_routes
            .iter()
            .find(|r| r.path == RoutingPath::new(0, 0))
            .unwrap();
        assert!(route.connected);
        assert!(route.effects_graph.is_none());
        // Bare splitter -> merger edge is back
        assert!(router
            .ctx
            .is_connected_ports(router.splitter, 0, router.merger, 0));
    }

    #[test]
    fn test_set_and_find_effect_params() {
        let mut router = make_router(2, 2);
        let batch = router
            .set_audio_effects_graphs(&filter_def(), RouteSelector::input(0))
            .unwrap();
        router.wait_for_effects(&batch);

        router
            .set_audio_effects_params(
                EffectParam {
                    id: EffectParamId::FilterCutoff,
                    value: 440.0,
                },
                &EffectsFilter {
                    routes: RouteSelector::input(0),
                    effect_type: Some(EffectType::Filter),
                },
            )
            .unwrap();

        let effects = router
            .find_audio_effects(&EffectsFilter {
                routes: RouteSelector::input(0),
                effect_type: Some(EffectType::Filter),
            })
            .unwrap();
        assert_eq!(effects.len(), 2);
        for info in effects {
            let cutoff = info
                .params
                .iter()
                .find(|p| p.id == EffectParamId::FilterCutoff)
                .unwrap();
            assert_eq!(cutoff.value, 440.0);
        }
    }

    #[test]
    fn test_connect_source_replaces_previous() {
        let ctx = AudioGraphContext::offline(48000, 2);
        let output = ctx.destination();
        let mut router = AudioRouter::new(ctx.clone(), output, 2);

        let a = ctx.create_gain(1.0, 2);
        let b = ctx.create_gain(1.0, 2);
        router.connect_source(a);
        router.connect_source(b);

        assert!(!ctx.is_connected(a, router.splitter));
        assert!(ctx.is_connected(b, router.splitter));

        router.disconnect_source();
        router.disconnect_source();
        assert!(!ctx.is_connected(b, router.splitter));
    }

    #[test]
    fn test_destroy_tears_down_nodes() {
        let ctx = AudioGraphContext::offline(48000, 2);
        let output = ctx.destination();
        let mut router = AudioRouter::new(ctx.clone(), output, 2);
        let rx = router.subscribe_changes();

        router.destroy();
        router.destroy();

        assert!(!ctx.node_exists(router.splitter));
        assert!(!ctx.node_exists(router.merger));
        assert!(rx.try_recv().is_err());
    }
}
