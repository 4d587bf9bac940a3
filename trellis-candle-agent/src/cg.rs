//! Matrix-free conjugate-gradient solver.
use crate::util::dot;
use anyhow::Result;

/// Approximately solves `A x = b` for symmetric positive-definite `A` given
/// only the matrix-vector product `av`.
///
/// The iteration budget is a hard bound; if the residual has not shrunk
/// below `tol` by then, the best iterate found so far is returned. Running
/// out of budget is expected truncated-Newton behavior, not an error.
pub fn conjugate_gradient<F>(mut av: F, b: &[f32], iters: usize, tol: f64) -> Result<Vec<f32>>
where
    F: FnMut(&[f32]) -> Result<Vec<f32>>,
{
    let mut x = vec![0.0f32; b.len()];
    let mut r = b.to_vec();
    let mut p = b.to_vec();
    let mut rs = dot(&r, &r);

    for _ in 0..iters {
        if rs.sqrt() <= tol {
            break;
        }
        let ap = av(&p)?;
        let pap = dot(&p, &ap);
        if pap <= 0.0 {
            // Curvature estimate lost positive-definiteness to noise; the
            // current iterate is the best we can trust.
            break;
        }
        let alpha = rs / pap;
        for (xi, pi) in x.iter_mut().zip(&p) {
            *xi += (alpha * *pi as f64) as f32;
        }
        for (ri, api) in r.iter_mut().zip(&ap) {
            *ri -= (alpha * *api as f64) as f32;
        }
        let rs_new = dot(&r, &r);
        let beta = rs_new / rs;
        for (pi, ri) in p.iter_mut().zip(&r) {
            *pi = ri + (beta * *pi as f64) as f32;
        }
        rs = rs_new;
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matvec(a: &[[f32; 3]; 3], v: &[f32]) -> Vec<f32> {
        a.iter()
            .map(|row| row.iter().zip(v).map(|(x, y)| x * y).sum())
            .collect()
    }

    #[test]
    fn solves_a_small_spd_system() {
        let a = [[4.0, 1.0, 0.0], [1.0, 3.0, 0.5], [0.0, 0.5, 2.0]];
        let b = [1.0, 2.0, 3.0];
        let x = conjugate_gradient(|v| Ok(matvec(&a, v)), &b, 50, 1e-10).unwrap();
        let ax = matvec(&a, &x);
        for (got, want) in ax.iter().zip(&b) {
            assert!((got - want).abs() < 1e-3, "{} vs {}", got, want);
        }
    }

    #[test]
    fn respects_the_iteration_budget() {
        let a = [[4.0, 1.0, 0.0], [1.0, 3.0, 0.5], [0.0, 0.5, 2.0]];
        let b = [1.0, 2.0, 3.0];
        let mut calls = 0;
        let _ = conjugate_gradient(
            |v| {
                calls += 1;
                Ok(matvec(&a, v))
            },
            &b,
            2,
            0.0,
        )
        .unwrap();
        assert!(calls <= 2);
    }

    #[test]
    fn zero_rhs_yields_zero_solution() {
        let x = conjugate_gradient(|v| Ok(v.to_vec()), &[0.0, 0.0], 10, 1e-12).unwrap();
        assert_eq!(x, vec![0.0, 0.0]);
    }
}
