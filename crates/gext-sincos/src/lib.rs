// ─────────────────────────────────────────────────────────────────────
// External Equation Kernel — Sine/Cosine Reference Module
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Two external equations over four variables:
//!
//!   e1: sin(x1) - x3 = 0
//!   e2: cos(x2) - x4 = 0
//!
//! The linear terms `-x3` and `-x4` have constant derivatives, which the
//! module declares at Init. The host model typically adds linear parts
//! of its own around these residuals.

use gext_core::{Capabilities, Dimensions, EvalRequest, ExternalModule, Messages};
use gext_types::{GextError, GextResult};

pub const N_EQUATIONS: usize = 2;
pub const N_VARIABLES: usize = 4;
pub const N_NONZEROS: usize = 4;

/// Reference module evaluating the sine/cosine residuals.
#[derive(Debug, Default, Clone)]
pub struct SinCos {
    /// Evaluate calls served since Init.
    evaluations: u64,
    /// Evaluate calls that reused the previous point.
    repeated_points: u64,
}

impl SinCos {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    pub fn repeated_points(&self) -> u64 {
        self.repeated_points
    }

    /// Residual of equation `eq` (1-based) at `x`.
    fn residual(eq: usize, x: &[f64]) -> GextResult<f64> {
        if x.len() < N_VARIABLES {
            return Err(GextError::Layout(format!(
                "x has {} entries, need {N_VARIABLES}",
                x.len()
            )));
        }
        match eq {
            1 => Ok(x[0].sin() - x[2]),
            2 => Ok(x[1].cos() - x[3]),
            _ => Err(unknown_equation(eq)),
        }
    }

    /// Position and value of the single constant derivative of `eq`.
    fn linear_term(eq: usize) -> (usize, f64) {
        (eq + 1, -1.0)
    }
}

impl ExternalModule for SinCos {
    fn dimensions(&self) -> Dimensions {
        Dimensions {
            equations: N_EQUATIONS,
            variables: N_VARIABLES,
            nonzeros: N_NONZEROS,
        }
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            constant_derivatives: true,
            hessian_vector_products: true,
        }
    }

    fn init(&mut self, _messages: &mut Messages<'_, '_, '_>) -> GextResult<()> {
        self.evaluations = 0;
        self.repeated_points = 0;
        Ok(())
    }

    fn evaluate(
        &mut self,
        request: &EvalRequest,
        x: &[f64],
        f: &mut f64,
        d: &mut [f64],
        _messages: &mut Messages<'_, '_, '_>,
    ) -> GextResult<()> {
        self.evaluations += 1;
        if !request.new_point {
            self.repeated_points += 1;
        }

        if request.do_function {
            *f = Self::residual(request.equation, x)?;
        }
        // Derivatives of the linear terms are written on every call too.
        if request.do_derivatives {
            match request.equation {
                1 => d[0] = x[0].cos(),
                2 => d[1] = -x[1].sin(),
                other => return Err(unknown_equation(other)),
            }
            let (linear, slope) = Self::linear_term(request.equation);
            d[linear] = slope;
        }
        Ok(())
    }

    fn constant_derivatives(
        &mut self,
        equation: usize,
        d: &mut [f64],
        _messages: &mut Messages<'_, '_, '_>,
    ) -> GextResult<()> {
        if !(1..=N_EQUATIONS).contains(&equation) {
            return Err(unknown_equation(equation));
        }
        let (linear, slope) = Self::linear_term(equation);
        d[linear] = slope;
        Ok(())
    }

    fn hessian_vector_product(
        &mut self,
        equation: usize,
        x: &[f64],
        direction: &[f64],
        product: &mut [f64],
        _messages: &mut Messages<'_, '_, '_>,
    ) -> GextResult<()> {
        // Only the diagonal entry of the nonlinear variable is nonzero.
        match equation {
            1 => product[0] = -x[0].sin() * direction[0],
            2 => product[1] = -x[1].cos() * direction[1],
            other => return Err(unknown_equation(other)),
        }
        Ok(())
    }

    fn terminate(&mut self, messages: &mut Messages<'_, '_, '_>) -> GextResult<()> {
        log::debug!(
            "sincos: {} evaluations, {} at a repeated point",
            self.evaluations,
            self.repeated_points
        );
        messages.log(&format!("--- {} evaluations served", self.evaluations));
        Ok(())
    }
}

fn unknown_equation(eq: usize) -> GextError {
    GextError::EquationIndex {
        index: i32::try_from(eq).unwrap_or(i32::MAX),
        count: N_EQUATIONS as i32,
    }
}
