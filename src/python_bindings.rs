use pyo3::prelude::*;
use pyo3::types::{PyList, PyTuple};

use crate::average::{Kernel, Policy};
use crate::driver::{run_file, SweepConfig};
use crate::sweep::QSweep;

/// Python binding computing the P(Q) table of a trajectory file
#[pyfunction]
#[pyo3(signature = (trajectory_file, q0, qmax, m, parallel=false, workers=3, max_frames=None, pairwise=false))]
#[allow(clippy::too_many_arguments)]
fn structure_factor(
    py: Python<'_>,
    trajectory_file: &str,
    q0: f64,
    qmax: f64,
    m: usize,
    parallel: bool,
    workers: usize,
    max_frames: Option<usize>,
    pairwise: bool,
) -> PyResult<PyObject> {
    let config = SweepConfig {
        q0,
        qmax,
        points: m,
        policy: if parallel { Policy::Parallel { workers } } else { Policy::Serial },
        kernel: if pairwise { Kernel::Pairwise } else { Kernel::Dense },
        max_frames,
        progress: false,
    };

    // the sweep does not touch Python objects, let other Python threads run
    let points = py
        .allow_threads(|| run_file(std::path::Path::new(trajectory_file), &config))
        .map_err(|e| PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("Failed to compute structure factor: {}", e)))?;

    // Convert points to Python list of (q, p) tuples
    let py_points = PyList::empty_bound(py);
    for point in points {
        let py_tuple = PyTuple::new_bound(py, &[point.q.into_py(py), point.p.into_py(py)]);
        py_points.append(py_tuple)?;
    }

    Ok(py_points.into())
}

/// Python binding for the Q sweep values
#[pyfunction]
fn q_values(q0: f64, qmax: f64, m: usize) -> PyResult<Vec<f64>> {
    let sweep = QSweep::new(q0, qmax, m)
        .map_err(|e| PyErr::new::<pyo3::exceptions::PyValueError, _>(e.to_string()))?;
    Ok(sweep.collect())
}

/// Python module definition
#[pymodule]
fn structure_factor_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(structure_factor, m)?)?;
    m.add_function(wrap_pyfunction!(q_values, m)?)?;
    m.add("__doc__", "Structure factor P(Q) of MD trajectories, Rust library with Python bindings")?;
    Ok(())
}
