//! Linearised (DC) power flow.
//!
//! Solves `B' θ = P` on the bus susceptance matrix with the slack bus angle
//! held fixed. Voltage magnitudes are not part of the DC model; buses take the
//! set point of their external grid or generator, else 1.0 p.u.

use crate::grid::PowerGrid;

const PIVOT_TOLERANCE: f64 = 1e-12;

/// Solution of one DC power flow.
#[derive(Debug, Clone, PartialEq)]
pub struct DcSolution {
    /// Bus voltage angles in radians.
    pub angles: Vec<f64>,
    /// Net active injection per bus in p.u. (generation minus demand).
    pub injections: Vec<f64>,
    /// Index of the slack bus.
    pub slack_bus: usize,
}

/// Bus susceptance matrix (p.u.) over in-service lines, plus per-line
/// susceptance (0 for skipped lines).
pub fn susceptance_matrix(grid: &PowerGrid) -> (Vec<Vec<f64>>, Vec<f64>) {
    let n = grid.bus.len();
    let base_mva = grid.sn_mva as f64;
    let mut matrix = vec![vec![0.0; n]; n];
    let mut line_b = vec![0.0; grid.line.len()];

    for (index, line) in grid.line.iter().enumerate() {
        if !line.in_service || line.from_bus == line.to_bus {
            continue;
        }
        let (from, to) = (line.from_bus, line.to_bus);
        let vn_kv = grid.bus[from].vn_kv as f64;
        let z_base = vn_kv * vn_kv / base_mva;
        let x_pu = line.x_ohm_per_km as f64 * line.length_km as f64 / z_base;
        if !x_pu.is_finite() || x_pu.abs() < PIVOT_TOLERANCE {
            log::warn!("Line {index} has no usable reactance, skipped");
            continue;
        }
        let b = 1.0 / x_pu;
        line_b[index] = b;
        matrix[from][from] += b;
        matrix[to][to] += b;
        matrix[from][to] -= b;
        matrix[to][from] -= b;
    }
    (matrix, line_b)
}

/// Specified net active injection per bus, in p.u.
pub fn bus_injections(grid: &PowerGrid) -> Vec<f64> {
    let base_mva = grid.sn_mva as f64;
    let mut p = vec![0.0; grid.bus.len()];
    for load in &grid.load {
        p[load.0.bus] -= load.0.effective_p_mw() as f64 / base_mva;
    }
    for sgen in &grid.sgen {
        p[sgen.0.bus] += sgen.0.effective_p_mw() as f64 / base_mva;
    }
    for gen in &grid.gen {
        p[gen.bus] += gen.effective_p_mw() as f64 / base_mva;
    }
    p
}

/// Slack bus and its angle in radians: the first in-service external grid,
/// else the first in-service generator flagged as slack, else the first
/// in-service generator.
pub fn slack_bus(grid: &PowerGrid) -> Option<(usize, f64)> {
    if let Some(ext) = grid.ext_grid.iter().find(|e| e.in_service) {
        return Some((ext.bus, (ext.va_degree as f64).to_radians()));
    }
    grid.gen
        .iter()
        .find(|g| g.in_service && g.slack)
        .or_else(|| grid.gen.iter().find(|g| g.in_service))
        .map(|g| (g.bus, 0.0))
}

/// Solve `A x = b` by Gaussian elimination with partial pivoting.
///
/// Returns `None` for a singular system.
pub fn solve_linear_system(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < PIVOT_TOLERANCE {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

/// Solve the DC power flow without touching the grid.
///
/// Returns `None` without slack or when the reduced system is singular
/// (e.g. an island without slack).
pub fn solve_dc(grid: &PowerGrid) -> Option<DcSolution> {
    let n = grid.bus.len();
    let (slack, slack_angle) = slack_bus(grid)?;
    let (matrix, _) = susceptance_matrix(grid);
    let injections = bus_injections(grid);

    let others: Vec<usize> = (0..n).filter(|&i| i != slack).collect();
    let reduced: Vec<Vec<f64>> = others
        .iter()
        .map(|&i| others.iter().map(|&j| matrix[i][j]).collect())
        .collect();
    let rhs: Vec<f64> = others
        .iter()
        .map(|&i| injections[i] - matrix[i][slack] * slack_angle)
        .collect();

    let solved = solve_linear_system(reduced, rhs)?;
    let mut angles = vec![slack_angle; n];
    for (&bus, theta) in others.iter().zip(solved) {
        angles[bus] = theta;
    }

    Some(DcSolution {
        angles,
        injections,
        slack_bus: slack,
    })
}

fn clear_results(grid: &mut PowerGrid) {
    for bus in &mut grid.bus {
        bus.res_vm_pu = 0.0;
        bus.res_va_degree = 0.0;
        bus.res_p_mw = 0.0;
        bus.res_q_mvar = 0.0;
    }
    for load in grid.load.iter_mut().map(|l| &mut l.0).chain(grid.sgen.iter_mut().map(|s| &mut s.0)) {
        load.res_p_mw = 0.0;
        load.res_q_mvar = 0.0;
    }
    for gen in &mut grid.gen {
        gen.res_p_mw = 0.0;
        gen.res_q_mvar = 0.0;
        gen.res_va_degree = 0.0;
        gen.res_vm_pu = 0.0;
    }
    for ext in &mut grid.ext_grid {
        ext.res_p_mw = 0.0;
        ext.res_q_mvar = 0.0;
    }
    for line in &mut grid.line {
        line.res_p_from_mw = 0.0;
        line.res_p_to_mw = 0.0;
        line.res_pl_mw = 0.0;
        line.res_i_ka = 0.0;
        line.res_loading_percent = 0.0;
    }
}

/// Run the DC power flow and store its results on the grid.
///
/// Returns whether the flow converged. A non-converged grid has zeroed
/// results and `converged == false`.
pub fn run_dc_power_flow(grid: &mut PowerGrid) -> bool {
    clear_results(grid);
    if grid.bus.is_empty() {
        grid.converged = true;
        return true;
    }
    let Some(solution) = solve_dc(grid) else {
        grid.converged = false;
        return false;
    };

    let base_mva = grid.sn_mva as f64;
    let (matrix, line_b) = susceptance_matrix(grid);
    let n = grid.bus.len();

    // Voltage magnitude set points: generators first, external grids win.
    let mut vm = vec![1.0f32; n];
    for gen in grid.gen.iter().filter(|g| g.in_service) {
        vm[gen.bus] = gen.vm_pu;
    }
    for ext in grid.ext_grid.iter().filter(|e| e.in_service) {
        vm[ext.bus] = ext.vm_pu;
    }

    let calculated: Vec<f64> = (0..n)
        .map(|i| (0..n).map(|j| matrix[i][j] * solution.angles[j]).sum())
        .collect();

    for (i, bus) in grid.bus.iter_mut().enumerate() {
        bus.res_vm_pu = if bus.in_service { vm[i] } else { 0.0 };
        bus.res_va_degree = solution.angles[i].to_degrees() as f32;
        bus.res_p_mw = (-calculated[i] * base_mva) as f32;
        bus.res_q_mvar = 0.0;
    }

    for injection in grid
        .load
        .iter_mut()
        .map(|l| &mut l.0)
        .chain(grid.sgen.iter_mut().map(|s| &mut s.0))
    {
        injection.res_p_mw = injection.effective_p_mw();
        injection.res_q_mvar = injection.effective_q_mvar();
    }

    for gen in &mut grid.gen {
        gen.res_p_mw = gen.effective_p_mw();
        gen.res_q_mvar = 0.0;
        gen.res_va_degree = solution.angles[gen.bus].to_degrees() as f32;
        gen.res_vm_pu = if gen.in_service { vm[gen.bus] } else { 0.0 };
    }

    // The slack balances the system: calculated minus specified injection.
    let slack = solution.slack_bus;
    let slack_p = (calculated[slack] - solution.injections[slack]) * base_mva;
    let mut assigned = false;
    for ext in &mut grid.ext_grid {
        if ext.in_service && !assigned && ext.bus == slack {
            ext.res_p_mw = slack_p as f32;
            assigned = true;
        }
    }
    if !assigned {
        if let Some(gen) = grid
            .gen
            .iter_mut()
            .find(|g| g.in_service && g.bus == slack)
        {
            gen.res_p_mw += slack_p as f32;
        }
    }

    for (index, line) in grid.line.iter_mut().enumerate() {
        let b = line_b[index];
        if b == 0.0 {
            continue;
        }
        let p_from =
            b * (solution.angles[line.from_bus] - solution.angles[line.to_bus]) * base_mva;
        let vn_kv = grid.bus[line.from_bus].vn_kv as f64;
        let i_ka = if vn_kv > 0.0 {
            p_from.abs() / (3f64.sqrt() * vn_kv)
        } else {
            0.0
        };
        line.res_p_from_mw = p_from as f32;
        line.res_p_to_mw = -p_from as f32;
        line.res_pl_mw = 0.0;
        line.res_i_ka = i_ka as f32;
        line.res_loading_percent = if line.max_i_ka > 0.0 {
            (i_ka / line.max_i_ka as f64 * 100.0) as f32
        } else {
            0.0
        };
    }

    grid.converged = true;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Bus, ExtGrid, Injection, Line, Load};

    fn bus(vn_kv: f32) -> Bus {
        Bus {
            name: String::new(),
            vn_kv,
            in_service: true,
            min_vm_pu: 0.9,
            max_vm_pu: 1.1,
            res_vm_pu: 0.0,
            res_va_degree: 0.0,
            res_p_mw: 0.0,
            res_q_mvar: 0.0,
        }
    }

    fn line(from_bus: usize, to_bus: usize, x_ohm_per_km: f32) -> Line {
        Line {
            from_bus,
            to_bus,
            name: String::new(),
            length_km: 1.0,
            r_ohm_per_km: 0.0,
            x_ohm_per_km,
            max_i_ka: 1.0,
            in_service: true,
            res_p_from_mw: 0.0,
            res_p_to_mw: 0.0,
            res_pl_mw: 0.0,
            res_i_ka: 0.0,
            res_loading_percent: 0.0,
        }
    }

    fn load(bus: usize, p_mw: f32) -> Load {
        Load(Injection {
            bus,
            name: String::new(),
            p_mw,
            q_mvar: 0.0,
            scaling: 1.0,
            in_service: true,
            res_p_mw: 0.0,
            res_q_mvar: 0.0,
        })
    }

    fn ext_grid(bus: usize) -> ExtGrid {
        ExtGrid {
            bus,
            name: String::new(),
            vm_pu: 1.02,
            va_degree: 0.0,
            in_service: true,
            res_p_mw: 0.0,
            res_q_mvar: 0.0,
        }
    }

    /// Three buses in a row, 10 kV, 1 MVA base: z_base = 100 ohm.
    fn radial() -> PowerGrid {
        let mut grid = PowerGrid::new("radial");
        grid.bus = vec![bus(10.0), bus(10.0), bus(10.0)];
        grid.line = vec![line(0, 1, 10.0), line(1, 2, 10.0)];
        grid.load = vec![load(2, 0.5)];
        grid.ext_grid = vec![ext_grid(0)];
        grid
    }

    #[test]
    fn test_linear_solver() {
        let a = vec![vec![2.0, 1.0], vec![1.0, 3.0]];
        let x = solve_linear_system(a, vec![3.0, 5.0]).unwrap();
        assert!((x[0] - 0.8).abs() < 1e-12);
        assert!((x[1] - 1.4).abs() < 1e-12);
        assert!(solve_linear_system(vec![vec![1.0, 2.0], vec![2.0, 4.0]], vec![1.0, 2.0]).is_none());
    }

    #[test]
    fn test_radial_flow() {
        let mut grid = radial();
        assert!(run_dc_power_flow(&mut grid));
        assert!(grid.converged);

        // Each line carries the full load; x = 0.1 p.u.
        for line in &grid.line {
            assert!((line.res_p_from_mw - 0.5).abs() < 1e-5);
            assert!((line.res_p_to_mw + 0.5).abs() < 1e-5);
        }
        // theta_2 = -2 * 0.1 * 0.5 rad
        assert!((grid.bus[2].res_va_degree - (-0.1f64).to_degrees() as f32).abs() < 1e-4);
        assert!((grid.ext_grid[0].res_p_mw - 0.5).abs() < 1e-5);
        assert!((grid.bus[2].res_p_mw - 0.5).abs() < 1e-5);
        assert_eq!(grid.bus[0].res_vm_pu, 1.02);
        assert_eq!(grid.bus[1].res_vm_pu, 1.0);
    }

    #[test]
    fn test_island_does_not_converge() {
        let mut grid = radial();
        grid.line[1].in_service = false;
        grid.bus[2].res_vm_pu = 0.7;
        assert!(!run_dc_power_flow(&mut grid));
        assert!(!grid.converged);
        assert_eq!(grid.bus[2].res_vm_pu, 0.0);
    }

    #[test]
    fn test_no_slack_does_not_converge() {
        let mut grid = radial();
        grid.ext_grid.clear();
        assert!(!run_dc_power_flow(&mut grid));
    }
}
