//! Input × output connection matrix.
//!
//! The matrix mirrors the edges between each channel's processor node and
//! the merger. [`Audio`](crate::Audio) consults it before every connect or
//! disconnect, so graph edits never duplicate or miss an edge.

/// Wiring state of one (input, output) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No edge between the input's processor and this merger input.
    #[default]
    NotConnected,
    /// The edge exists in the graph.
    Connected,
}

impl ConnectionState {
    /// Returns `true` for [`ConnectionState::Connected`].
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

/// Dense `[input][output]` table of [`ConnectionState`].
///
/// Grows on demand; new cells start out [`ConnectionState::NotConnected`]
/// and existing cells keep their state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionMatrix {
    inputs: usize,
    outputs: usize,
    cells: Vec<ConnectionState>,
}

impl ConnectionMatrix {
    /// Creates an empty matrix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of input rows.
    pub fn inputs(&self) -> usize {
        self.inputs
    }

    /// Number of output columns.
    pub fn outputs(&self) -> usize {
        self.outputs
    }

    /// Grows the matrix to at least `inputs` × `outputs`. Never shrinks.
    pub fn grow(&mut self, inputs: usize, outputs: usize) {
        let inputs = inputs.max(self.inputs);
        let outputs = outputs.max(self.outputs);
        if inputs == self.inputs && outputs == self.outputs {
            return;
        }

        let mut cells = vec![ConnectionState::NotConnected; inputs * outputs];
        for row in 0..self.inputs {
            let old = &self.cells[row * self.outputs..(row + 1) * self.outputs];
            cells[row * outputs..row * outputs + self.outputs].copy_from_slice(old);
        }

        self.inputs = inputs;
        self.outputs = outputs;
        self.cells = cells;
    }

    /// State of a cell; out-of-range cells read as `NotConnected`.
    pub fn get(&self, input: usize, output: usize) -> ConnectionState {
        self.index(input, output)
            .map_or(ConnectionState::NotConnected, |i| self.cells[i])
    }

    /// Sets a cell, growing the matrix if needed.
    pub fn set(&mut self, input: usize, output: usize, state: ConnectionState) {
        self.grow(input + 1, output + 1);
        if let Some(i) = self.index(input, output) {
            self.cells[i] = state;
        }
    }

    /// Output indices connected for `input`, ascending.
    pub fn connected_in_row(&self, input: usize) -> Vec<usize> {
        (0..self.outputs)
            .filter(|&output| self.get(input, output).is_connected())
            .collect()
    }

    /// Number of connected cells in `input`'s row.
    pub fn connected_count(&self, input: usize) -> usize {
        (0..self.outputs)
            .filter(|&output| self.get(input, output).is_connected())
            .count()
    }

    /// Returns `true` if no cell anywhere is connected.
    pub fn is_clear(&self) -> bool {
        self.cells.iter().all(|c| !c.is_connected())
    }

    fn index(&self, input: usize, output: usize) -> Option<usize> {
        (input < self.inputs && output < self.outputs).then_some(input * self.outputs + output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_matrix_is_empty() {
        let matrix = ConnectionMatrix::new();
        assert_eq!(matrix.inputs(), 0);
        assert_eq!(matrix.outputs(), 0);
        assert_eq!(matrix.get(3, 4), ConnectionState::NotConnected);
        assert!(matrix.is_clear());
    }

    #[test]
    fn test_grow_defaults_to_not_connected() {
        let mut matrix = ConnectionMatrix::new();
        matrix.grow(2, 4);
        for input in 0..2 {
            for output in 0..4 {
                assert_eq!(matrix.get(input, output), ConnectionState::NotConnected);
            }
        }
    }

    #[test]
    fn test_grow_preserves_cells() {
        let mut matrix = ConnectionMatrix::new();
        matrix.grow(2, 2);
        matrix.set(0, 1, ConnectionState::Connected);
        matrix.set(1, 0, ConnectionState::Connected);

        matrix.grow(3, 4);

        assert_eq!(matrix.inputs(), 3);
        assert_eq!(matrix.outputs(), 4);
        assert_eq!(matrix.connected_in_row(0), vec![1]);
        assert_eq!(matrix.connected_in_row(1), vec![0]);
        assert!(matrix.connected_in_row(2).is_empty());
    }

    #[test]
    fn test_grow_never_shrinks() {
        let mut matrix = ConnectionMatrix::new();
        matrix.grow(4, 4);
        matrix.set(3, 3, ConnectionState::Connected);
        matrix.grow(1, 1);
        assert_eq!(matrix.get(3, 3), ConnectionState::Connected);
    }

    #[test]
    fn test_set_grows() {
        let mut matrix = ConnectionMatrix::new();
        matrix.set(2, 5, ConnectionState::Connected);
        assert_eq!(matrix.inputs(), 3);
        assert_eq!(matrix.outputs(), 6);
        assert_eq!(matrix.connected_count(2), 1);
    }

    #[test]
    fn test_row_queries() {
        let mut matrix = ConnectionMatrix::new();
        matrix.grow(2, 4);
        matrix.set(0, 0, ConnectionState::Connected);
        matrix.set(0, 3, ConnectionState::Connected);

        assert_eq!(matrix.connected_in_row(0), vec![0, 3]);
        assert_eq!(matrix.connected_count(0), 2);
        assert_eq!(matrix.connected_count(1), 0);

        matrix.set(0, 0, ConnectionState::NotConnected);
        matrix.set(0, 3, ConnectionState::NotConnected);
        assert!(matrix.is_clear());
    }
}
