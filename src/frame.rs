use ndarray::Array2;

use crate::error::{Error, Result};
use crate::structure::{Atom, Coordinate, PairDistanceCache, SimulationBox};

/// One trajectory snapshot: a periodic box and the atoms it contains.
///
/// The box must be set before any atom is added, every atom is wrapped into
/// the box when it is added. Atoms keep their admission order, so row `i` of
/// the distance matrix always refers to the `i`-th atom added.
#[derive(Debug, Clone)]
pub struct Frame {
    frame_id: i64,
    declared_atom_count: usize,
    simulation_box: Option<SimulationBox>,
    atoms: Vec<Atom>,
    structure_factor: Option<f64>,
}

impl Frame {
    pub fn new(frame_id: i64) -> Self {
        Self {
            frame_id,
            declared_atom_count: 0,
            simulation_box: None,
            atoms: Vec::new(),
            structure_factor: None,
        }
    }

    /// Create a frame with its box already set
    pub fn with_box(frame_id: i64, simulation_box: SimulationBox) -> Self {
        let mut frame = Self::new(frame_id);
        frame.simulation_box = Some(simulation_box);
        frame
    }

    pub fn frame_id(&self) -> i64 {
        self.frame_id
    }

    pub fn set_frame_id(&mut self, frame_id: i64) {
        self.frame_id = frame_id;
    }

    /// Atom count announced by the trajectory header. Only the reader uses it,
    /// the kernel works on the atoms actually added.
    pub fn declared_atom_count(&self) -> usize {
        self.declared_atom_count
    }

    pub fn set_declared_atom_count(&mut self, count: usize) {
        self.declared_atom_count = count;
    }

    pub fn simulation_box(&self) -> Option<&SimulationBox> {
        self.simulation_box.as_ref()
    }

    pub fn set_box(&mut self, simulation_box: SimulationBox) -> Result<()> {
        if self.simulation_box.is_some() {
            return Err(Error::BoxAlreadySet { frame_id: self.frame_id });
        }
        self.simulation_box = Some(simulation_box);
        Ok(())
    }

    /// Wrap the atom into the box and append it to the frame
    pub fn add_atom(&mut self, mut atom: Atom) -> Result<()> {
        let simulation_box = self
            .simulation_box
            .as_ref()
            .ok_or(Error::MissingBox { frame_id: self.frame_id })?;
        atom.position = simulation_box.wrap(&atom.position);
        self.atoms.push(atom);
        Ok(())
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn positions(&self) -> impl Iterator<Item = &Coordinate> + '_ {
        self.atoms.iter().map(|atom| &atom.position)
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    /// Result of the last call to `compute`/`compute_pairwise`, if it succeeded
    pub fn structure_factor(&self) -> Option<f64> {
        self.structure_factor
    }

    /// Compute this frame's contribution to P(Q) from the dense distance matrix.
    ///
    /// With `q = Q / x_length` and `d_ij` the distance between atoms `i` and
    /// `j` (zero on the diagonal):
    ///
    /// ```text
    /// P = 1/(N+1)^2 * Σ sin(q d_ij) / Σ q d_ij
    /// ```
    ///
    /// Distances are plain Euclidean distances between wrapped positions, no
    /// minimum image convention is applied. Frames with fewer than two atoms
    /// return [`Error::DegenerateFrame`].
    pub fn compute(&mut self, q_value: f64) -> Result<f64> {
        self.structure_factor = None;
        let q = self.scaled_q(q_value)?;
        let n = self.atoms.len();

        let mut matrix = self.distance_matrix(q_value)?;
        matrix *= q;
        matrix.diag_mut().fill(0.0);

        let total_distance = matrix.sum();
        matrix.mapv_inplace(f64::sin);
        let total_sin = matrix.sum();

        self.store(q_value, normalize(n, total_sin, total_distance))
    }

    /// Same reduction as [`Frame::compute`], accumulated pair by pair with
    /// distances memoized in `cache`.
    ///
    /// Distances do not depend on Q, so reusing one cache per frame across a
    /// sweep computes each pair distance once. The cache is keyed by atom id
    /// and must not be shared between frames.
    pub fn compute_pairwise(&mut self, q_value: f64, cache: &mut PairDistanceCache) -> Result<f64> {
        self.structure_factor = None;
        let q = self.scaled_q(q_value)?;
        let n = self.atoms.len();

        let mut total_distance = 0.0;
        let mut total_sin = 0.0;
        for (i, a) in self.atoms.iter().enumerate() {
            for (j, b) in self.atoms.iter().enumerate() {
                if i == j {
                    continue;
                }
                let scaled = cache.distance(a, b) * q;
                total_distance += scaled;
                total_sin += scaled.sin();
            }
        }

        self.store(q_value, normalize(n, total_sin, total_distance))
    }

    fn scaled_q(&self, q_value: f64) -> Result<f64> {
        let n = self.atoms.len();
        if n < 2 {
            return Err(Error::DegenerateFrame { frame_id: self.frame_id, q: q_value, atoms: n });
        }
        let simulation_box = self
            .simulation_box
            .as_ref()
            .ok_or(Error::MissingBox { frame_id: self.frame_id })?;
        Ok(q_value / simulation_box.x_length())
    }

    fn distance_matrix(&self, q_value: f64) -> Result<Array2<f64>> {
        let n = self.atoms.len();
        let allocation_error = || Error::Allocation { frame_id: self.frame_id, q: q_value, atoms: n };

        let size = n.checked_mul(n).ok_or_else(allocation_error)?;
        let mut data = Vec::new();
        data.try_reserve_exact(size).map_err(|_| allocation_error())?;

        for a in &self.atoms {
            for b in &self.atoms {
                data.push(a.position.distance_to(&b.position));
            }
        }

        Array2::from_shape_vec((n, n), data).map_err(|_| allocation_error())
    }

    fn store(&mut self, q_value: f64, value: f64) -> Result<f64> {
        if !value.is_finite() {
            return Err(Error::NonFiniteResult { frame_id: self.frame_id, q: q_value, value });
        }
        self.structure_factor = Some(value);
        Ok(value)
    }
}

fn normalize(n: usize, total_sin: f64, total_distance: f64) -> f64 {
    let k = 1.0 / ((n + 1) * (n + 1)) as f64;
    k * (total_sin / total_distance)
}
