//! Routing matrix data structures
//!
//! Pure data: paths, connections, the flat N-input x M-output matrix, route
//! selectors, and the default routing policy. No audio-graph dependencies.

use serde::{Deserialize, Serialize};

/// Immutable identity of a matrix cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoutingPath {
    pub input: usize,
    pub output: usize,
}

impl RoutingPath {
    pub fn new(input: usize, output: usize) -> Self {
        Self { input, output }
    }
}

/// One matrix cell: a path plus its connected flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingConnection {
    pub path: RoutingPath,
    pub connected: bool,
}

impl RoutingConnection {
    pub fn new(input: usize, output: usize, connected: bool) -> Self {
        Self {
            path: RoutingPath::new(input, output),
            connected,
        }
    }
}

/// The full connection matrix, stored flat (`input * outputs + output`)
///
/// Exactly one cell per (input, output) pair exists from construction to
/// teardown; cells are toggled, never inserted or removed.
#[derive(Debug, Clone)]
pub struct ConnectionMatrix {
    inputs: usize,
    outputs: usize,
    cells: Vec<RoutingConnection>,
}

impl ConnectionMatrix {
    /// Create a fully-disconnected matrix
    pub fn new(inputs: usize, outputs: usize) -> Self {
        let mut cells = Vec::with_capacity(inputs * outputs);
        for input in 0..inputs {
            for output in 0..outputs {
                cells.push(RoutingConnection::new(input, output, false));
            }
        }
        Self {
            inputs,
            outputs,
            cells,
        }
    }

    pub fn inputs(&self) -> usize {
        self.inputs
    }

    pub fn outputs(&self) -> usize {
        self.outputs
    }

    /// Flat index of a path, if it is in range
    pub fn index(&self, path: RoutingPath) -> Option<usize> {
        if path.input < self.inputs && path.output < self.outputs {
            Some(path.input * self.outputs + path.output)
        } else {
            None
        }
    }

    pub fn contains(&self, path: RoutingPath) -> bool {
        self.index(path).is_some()
    }

    pub fn get(&self, path: RoutingPath) -> Option<RoutingConnection> {
        self.index(path).map(|i| self.cells[i])
    }

    /// Set a cell's connected flag; returns the previous value
    pub fn set_connected(&mut self, path: RoutingPath, connected: bool) -> Option<bool> {
        let idx = self.index(path)?;
        let prev = self.cells[idx].connected;
        self.cells[idx].connected = connected;
        Some(prev)
    }

    /// All cells, in (input-major, output-minor) order
    pub fn cells(&self) -> &[RoutingConnection] {
        &self.cells
    }

    /// All cells of one input row
    pub fn row(&self, input: usize) -> &[RoutingConnection] {
        let start = input * self.outputs;
        &self.cells[start..start + self.outputs]
    }

    /// The connected cells of one input row
    pub fn connected_row(&self, input: usize) -> Vec<RoutingConnection> {
        self.row(input).iter().filter(|c| c.connected).copied().collect()
    }

    /// Number of connected cells of one input row
    pub fn live_count(&self, input: usize) -> usize {
        self.row(input).iter().filter(|c| c.connected).count()
    }
}

/// Partial-path selector over matrix cells
///
/// `{}` selects all routes, `{input}` one row, `{output}` one column,
/// `{input, output}` a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RouteSelector {
    pub input: Option<usize>,
    pub output: Option<usize>,
}

impl RouteSelector {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn input(input: usize) -> Self {
        Self {
            input: Some(input),
            output: None,
        }
    }

    pub fn output(output: usize) -> Self {
        Self {
            input: None,
            output: Some(output),
        }
    }

    pub fn cell(input: usize, output: usize) -> Self {
        Self {
            input: Some(input),
            output: Some(output),
        }
    }

    pub fn matches(&self, path: RoutingPath) -> bool {
        self.input.map_or(true, |i| i == path.input)
            && self.output.map_or(true, |o| o == path.output)
    }
}

/// Per-input solo/mute bookkeeping
///
/// Exactly one input may be soloed at any time. `unsolo_connections` is the
/// snapshot of every other input's live connections taken when solo was
/// engaged, used to restore them on unsolo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSoloMuteState {
    pub input_number: usize,
    pub soloed: bool,
    pub muted: bool,
    pub input_soloed_connections: Vec<RoutingConnection>,
    pub input_muted_connections: Vec<RoutingConnection>,
    pub unsolo_connections: Vec<RoutingConnection>,
}

impl InputSoloMuteState {
    pub fn new(input_number: usize) -> Self {
        Self {
            input_number,
            soloed: false,
            muted: false,
            input_soloed_connections: Vec::new(),
            input_muted_connections: Vec::new(),
            unsolo_connections: Vec::new(),
        }
    }
}

/// Default output count for a hardware channel count: 1 -> 1, 2-5 -> 2, >= 6 -> 6
pub fn default_outputs_number(max_channel_count: usize) -> usize {
    match max_channel_count {
        0 | 1 => 1,
        2..=5 => 2,
        _ => 6,
    }
}

/// Default routing table: diagonal best-effort mapping of N inputs to M outputs
///
/// A single mono input fans out to every output; otherwise input `i` connects
/// to output `i` where both exist. Always returns the full N*M table.
pub fn default_routing(inputs: usize, outputs: usize) -> Vec<RoutingConnection> {
    let mut table = Vec::with_capacity(inputs * outputs);
    for input in 0..inputs {
        for output in 0..outputs {
            let connected = if inputs == 1 {
                true
            } else {
                input == output
            };
            table.push(RoutingConnection::new(input, output, connected));
        }
    }
    table
}

/// Default routing for a single input row
pub fn default_routing_for_input(
    input: usize,
    inputs: usize,
    outputs: usize,
) -> Vec<RoutingConnection> {
    (0..outputs)
        .map(|output| {
            let connected = if inputs == 1 { true } else { input == output };
            RoutingConnection::new(input, output, connected)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_covers_every_pair_once() {
        let matrix = ConnectionMatrix::new(3, 2);
        assert_eq!(matrix.cells().len(), 6);
        for input in 0..3 {
            for output in 0..2 {
                let count = matrix
                    .cells()
                    .iter()
                    .filter(|c| c.path == RoutingPath::new(input, output))
                    .count();
                assert_eq!(count, 1);
            }
        }
    }

    #[test]
    fn test_out_of_range_path_rejected() {
        let matrix = ConnectionMatrix::new(2, 2);
        assert!(!matrix.contains(RoutingPath::new(2, 0)));
        assert!(!matrix.contains(RoutingPath::new(0, 2)));
        assert!(matrix.contains(RoutingPath::new(1, 1)));
    }

    #[test]
    fn test_set_connected_reports_previous() {
        let mut matrix = ConnectionMatrix::new(2, 2);
        let path = RoutingPath::new(0, 1);
        assert_eq!(matrix.set_connected(path, true), Some(false));
        assert_eq!(matrix.set_connected(path, true), Some(true));
        assert_eq!(matrix.live_count(0), 1);
    }

    #[test]
    fn test_selector_matching() {
        let path = RoutingPath::new(1, 2);
        assert!(RouteSelector::all().matches(path));
        assert!(RouteSelector::input(1).matches(path));
        assert!(!RouteSelector::input(0).matches(path));
        assert!(RouteSelector::output(2).matches(path));
        assert!(RouteSelector::cell(1, 2).matches(path));
        assert!(!RouteSelector::cell(1, 0).matches(path));
    }

    #[test]
    fn test_default_outputs_policy() {
        assert_eq!(default_outputs_number(1), 1);
        assert_eq!(default_outputs_number(2), 2);
        assert_eq!(default_outputs_number(5), 2);
        assert_eq!(default_outputs_number(6), 6);
        assert_eq!(default_outputs_number(8), 6);
    }

    #[test]
    fn test_default_routing_diagonal() {
        let table = default_routing(2, 2);
        assert_eq!(table.len(), 4);
        for conn in &table {
            assert_eq!(conn.connected, conn.path.input == conn.path.output);
        }
    }

    #[test]
    fn test_default_routing_mono_fans_out() {
        let table = default_routing(1, 2);
        assert!(table.iter().all(|c| c.connected));
    }
}
