// ─────────────────────────────────────────────────────────────────────
// External Equation Kernel — Mode Dispatcher
// ─────────────────────────────────────────────────────────────────────
//! Module-side state machine.
//!
//! Every call is self-contained: the dispatcher reads the mode from the
//! control vector, validates what the protocol requires, routes to the
//! matching [`ExternalModule`] method, and turns any error into a
//! diagnostic record plus a status code.
//!
//! | Mode | Checks | Module hook |
//! |---|---|---|
//! | Init | NEQ, NVAR, NZ against [`Dimensions`] | `init` |
//! | Evaluate | equation index in `[1, NEQ]` | `evaluate` |
//! | ConstantDerivative | equation index | `constant_derivatives` |
//! | HessianVectorProduct | equation index | `hessian_vector_product` |
//! | Terminate | — | `terminate` |

use gext_types::layout::Word;
use gext_types::{Destination, GextError, GextResult, KernelConfig, Mode, Status, StringKind};

use crate::extract::read_string;
use crate::packer::MessagePacker;
use crate::sink::DebugSink;
use crate::vector::ControlVector;

/// Problem size a module is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub equations: usize,
    pub variables: usize,
    pub nonzeros: usize,
}

/// Optional services a module declares at Init.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub constant_derivatives: bool,
    pub hessian_vector_products: bool,
}

/// The per-equation part of an Evaluate call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalRequest {
    /// 1-based, already checked against the equation count.
    pub equation: usize,
    pub do_function: bool,
    pub do_derivatives: bool,
    /// Hint only: unset means `x` is the same point as last call.
    pub new_point: bool,
}

/// Handle a module uses to write log and status lines during a call.
pub struct Messages<'a, 's, 'w> {
    packer: &'a MessagePacker<'s>,
    vector: &'a mut ControlVector<'w>,
}

impl<'a, 's, 'w> Messages<'a, 's, 'w> {
    pub fn new(packer: &'a MessagePacker<'s>, vector: &'a mut ControlVector<'w>) -> Self {
        Self { packer, vector }
    }

    pub fn log(&mut self, text: &str) {
        self.packer.log(self.vector, text);
    }

    pub fn status(&mut self, text: &str) {
        self.packer.status(self.vector, text);
    }

    /// Ask the host to deposit a string before the next Init call.
    pub fn request_string(&mut self, kind: StringKind) {
        self.vector.request_string(kind);
    }
}

/// An external equation module.
///
/// Only `dimensions` and `evaluate` are required; the remaining hooks
/// default to "nothing to do" or, for optional modes, to
/// [`GextError::Unsupported`].
pub trait ExternalModule {
    fn dimensions(&self) -> Dimensions;

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// A string the module requested has been delivered.
    fn receive_string(
        &mut self,
        _kind: Option<StringKind>,
        _value: &str,
        _messages: &mut Messages<'_, '_, '_>,
    ) -> GextResult<()> {
        Ok(())
    }

    /// Called after the problem size has been accepted.
    fn init(&mut self, _messages: &mut Messages<'_, '_, '_>) -> GextResult<()> {
        Ok(())
    }

    /// Write `f` when `request.do_function`, and the derivatives of the
    /// requested equation into `d` when `request.do_derivatives`. Entries
    /// of `d` the equation does not depend on must be left alone.
    fn evaluate(
        &mut self,
        request: &EvalRequest,
        x: &[f64],
        f: &mut f64,
        d: &mut [f64],
        messages: &mut Messages<'_, '_, '_>,
    ) -> GextResult<()>;

    /// Write the constant derivative entries of `equation` into `d`.
    fn constant_derivatives(
        &mut self,
        equation: usize,
        _d: &mut [f64],
        _messages: &mut Messages<'_, '_, '_>,
    ) -> GextResult<()> {
        Err(GextError::Unsupported(format!(
            "constant derivatives for equation {equation}"
        )))
    }

    /// Write the product of the Hessian of `equation` at `x` with
    /// `direction` into `product`, which arrives zeroed.
    fn hessian_vector_product(
        &mut self,
        equation: usize,
        _x: &[f64],
        _direction: &[f64],
        _product: &mut [f64],
        _messages: &mut Messages<'_, '_, '_>,
    ) -> GextResult<()> {
        Err(GextError::Unsupported(format!(
            "Hessian-vector product for equation {equation}"
        )))
    }

    /// Release module resources. No further calls follow.
    fn terminate(&mut self, _messages: &mut Messages<'_, '_, '_>) -> GextResult<()> {
        Ok(())
    }
}

/// A line the dispatcher itself wrote because something went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub destination: Destination,
    pub text: String,
}

/// Result of one dispatched call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// `None` when the mode code was not recognised.
    pub mode: Option<Mode>,
    pub status: Status,
    pub diagnostics: Vec<Diagnostic>,
}

impl Outcome {
    /// Integer returned to the host.
    pub fn code(&self) -> Word {
        self.status.code()
    }
}

/// Routes one call to a module.
pub struct Dispatcher<'s> {
    packer: MessagePacker<'s>,
    announce_calls: bool,
}

impl<'s> Dispatcher<'s> {
    pub fn new(sink: &'s dyn DebugSink, config: &KernelConfig) -> Self {
        Self {
            packer: MessagePacker::new(sink).with_force_debug(config.force_debug),
            announce_calls: config.announce_calls,
        }
    }

    /// Serve one call.
    ///
    /// `x` and `d` must hold at least the module's variable count for
    /// every mode other than Init and Terminate.
    pub fn dispatch<M: ExternalModule + ?Sized>(
        &self,
        module: &mut M,
        vector: &mut ControlVector<'_>,
        x: &[f64],
        f: &mut f64,
        d: &mut [f64],
    ) -> Outcome {
        let mode = match vector.mode() {
            Ok(mode) => mode,
            Err(err) => {
                log::warn!("{err}");
                let diagnostics = self.report(vector, &err, true);
                return Outcome {
                    mode: None,
                    status: err.status(),
                    diagnostics,
                };
            }
        };
        log::debug!(
            "dispatch {mode:?} eq={} dofunc={} dodrv={}",
            vector.equation_index(),
            vector.do_function(),
            vector.do_derivatives()
        );

        let result = match mode {
            Mode::Init => self.init(module, vector),
            Mode::Terminate => {
                self.announce(vector, mode);
                module.terminate(&mut Messages::new(&self.packer, vector))
            }
            Mode::Evaluate => self.evaluate(module, vector, x, f, d),
            Mode::ConstantDerivative => self.constant_derivatives(module, vector, d),
            Mode::HessianVectorProduct => self.hessian_vector_product(module, vector, x, d),
        };

        match result {
            Ok(()) => Outcome {
                mode: Some(mode),
                status: Status::Ok,
                diagnostics: Vec::new(),
            },
            Err(err) => {
                log::warn!("{mode:?} failed: {err}");
                // A size mismatch is reported once, to the log only.
                let both = !matches!(err, GextError::DimensionMismatch { .. });
                let diagnostics = self.report(vector, &err, both);
                Outcome {
                    mode: Some(mode),
                    status: err.status(),
                    diagnostics,
                }
            }
        }
    }

    fn init<M: ExternalModule + ?Sized>(
        &self,
        module: &mut M,
        vector: &mut ControlVector<'_>,
    ) -> GextResult<()> {
        if vector.string_loaded() {
            let kind = vector.string_request();
            let value = read_string(vector)?;
            vector.clear_string_request();
            module.receive_string(kind, &value, &mut Messages::new(&self.packer, vector))?;
        }

        let expected = module.dimensions();
        check_dimension("equations", vector.equations(), expected.equations)?;
        check_dimension("variables", vector.variables(), expected.variables)?;
        check_dimension("nonzero derivatives", vector.nonzeros(), expected.nonzeros)?;

        let caps = module.capabilities();
        vector.set_constant_derivatives(caps.constant_derivatives);
        vector.set_hessian_vector_products(caps.hessian_vector_products);
        if self.announce_calls {
            self.packer.log(vector, "--- Model has the correct size.");
        }
        module.init(&mut Messages::new(&self.packer, vector))
    }

    fn evaluate<M: ExternalModule + ?Sized>(
        &self,
        module: &mut M,
        vector: &mut ControlVector<'_>,
        x: &[f64],
        f: &mut f64,
        d: &mut [f64],
    ) -> GextResult<()> {
        self.announce(vector, Mode::Evaluate);
        let equation = checked_equation(vector)?;
        check_arrays(module.dimensions(), x, d)?;
        let request = EvalRequest {
            equation,
            do_function: vector.do_function(),
            do_derivatives: vector.do_derivatives(),
            new_point: vector.new_point(),
        };
        module.evaluate(&request, x, f, d, &mut Messages::new(&self.packer, vector))
    }

    fn constant_derivatives<M: ExternalModule + ?Sized>(
        &self,
        module: &mut M,
        vector: &mut ControlVector<'_>,
        d: &mut [f64],
    ) -> GextResult<()> {
        self.announce(vector, Mode::ConstantDerivative);
        let equation = checked_equation(vector)?;
        check_derivatives(module.dimensions(), d)?;
        module.constant_derivatives(equation, d, &mut Messages::new(&self.packer, vector))
    }

    /// `d` carries the direction in and the product out.
    fn hessian_vector_product<M: ExternalModule + ?Sized>(
        &self,
        module: &mut M,
        vector: &mut ControlVector<'_>,
        x: &[f64],
        d: &mut [f64],
    ) -> GextResult<()> {
        self.announce(vector, Mode::HessianVectorProduct);
        let equation = checked_equation(vector)?;
        check_arrays(module.dimensions(), x, d)?;
        let direction = d.to_vec();
        d.fill(0.0);
        let result = module.hessian_vector_product(
            equation,
            x,
            &direction,
            d,
            &mut Messages::new(&self.packer, vector),
        );
        if result.is_err() {
            d.copy_from_slice(&direction);
        }
        result
    }

    fn announce(&self, vector: &mut ControlVector<'_>, mode: Mode) {
        if self.announce_calls {
            self.packer.log(vector, &format!("--- {}", mode.label()));
        }
    }

    fn report(
        &self,
        vector: &mut ControlVector<'_>,
        err: &GextError,
        to_status: bool,
    ) -> Vec<Diagnostic> {
        let text = format!(" ** {err}");
        let mut destinations = vec![Destination::Log];
        if to_status {
            destinations.push(Destination::Status);
        }
        destinations
            .into_iter()
            .map(|destination| {
                self.packer.append(vector, &text, destination);
                Diagnostic {
                    destination,
                    text: text.clone(),
                }
            })
            .collect()
    }
}

fn check_dimension(what: &'static str, host: Word, module: usize) -> GextResult<()> {
    if usize::try_from(host).ok() == Some(module) {
        return Ok(());
    }
    Err(GextError::DimensionMismatch {
        what,
        host,
        module: module as Word,
    })
}

fn checked_equation(vector: &ControlVector<'_>) -> GextResult<usize> {
    let index = vector.equation_index();
    let count = vector.equations();
    if index < 1 || index > count {
        return Err(GextError::EquationIndex { index, count });
    }
    Ok(index as usize)
}

/// Constant derivatives never read `x`, so only `d` is sized.
fn check_derivatives(dims: Dimensions, d: &[f64]) -> GextResult<()> {
    if d.len() < dims.variables {
        return Err(GextError::Layout(format!(
            "d has {} entries, module needs {}",
            d.len(),
            dims.variables
        )));
    }
    Ok(())
}

fn check_arrays(dims: Dimensions, x: &[f64], d: &[f64]) -> GextResult<()> {
    if x.len() < dims.variables || d.len() < dims.variables {
        return Err(GextError::Layout(format!(
            "x has {} and d has {} entries, module needs {}",
            x.len(),
            d.len(),
            dims.variables
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use gext_types::layout::{CONST_DERIV, HV_PROD};

    use super::*;
    use crate::records::records;
    use crate::sink::{MemorySink, NullSink};
    use crate::vector::OwnedControlVector;

    /// f_i(x) = x_i^2 for two equations over two variables.
    #[derive(Default)]
    struct Squares {
        terminated: bool,
        received: Option<(Option<StringKind>, String)>,
        want_string: bool,
    }

    impl ExternalModule for Squares {
        fn dimensions(&self) -> Dimensions {
            Dimensions {
                equations: 2,
                variables: 2,
                nonzeros: 2,
            }
        }

        fn receive_string(
            &mut self,
            kind: Option<StringKind>,
            value: &str,
            _messages: &mut Messages<'_, '_, '_>,
        ) -> GextResult<()> {
            self.received = Some((kind, value.to_string()));
            Ok(())
        }

        fn init(&mut self, messages: &mut Messages<'_, '_, '_>) -> GextResult<()> {
            if self.want_string && self.received.is_none() {
                messages.request_string(StringKind::WorkDir);
            }
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
            let i = request.equation - 1;
            if x[i] < 0.0 {
                return Err(GextError::Evaluation(format!("x{} negative", i + 1)));
            }
            if request.do_function {
                *f = x[i] * x[i];
            }
            if request.do_derivatives {
                d[i] = 2.0 * x[i];
            }
            Ok(())
        }

        fn terminate(&mut self, messages: &mut Messages<'_, '_, '_>) -> GextResult<()> {
            self.terminated = true;
            messages.log("bye");
            Ok(())
        }
    }

    fn host(mode: Mode) -> OwnedControlVector {
        let mut host = OwnedControlVector::with_buffer(128);
        host.set_problem(2, 2, 2);
        host.set_mode(mode);
        host
    }

    fn quiet() -> KernelConfig {
        KernelConfig {
            announce_calls: false,
            ..Default::default()
        }
    }

    fn run(
        module: &mut Squares,
        host: &mut OwnedControlVector,
        config: &KernelConfig,
        x: &[f64],
        f: &mut f64,
        d: &mut [f64],
    ) -> Outcome {
        let dispatcher = Dispatcher::new(&NullSink, config);
        let mut cv = host.view().unwrap();
        dispatcher.dispatch(module, &mut cv, x, f, d)
    }

    fn texts(host: &mut OwnedControlVector) -> Vec<(Option<Destination>, String)> {
        let cv = host.view().unwrap();
        records(&cv)
            .map(|r| (r.destination, r.text().into_owned()))
            .collect()
    }

    #[test]
    fn test_init_accepts_matching_sizes() {
        let mut host = host(Mode::Init);
        let mut module = Squares::default();
        let out = run(&mut module, &mut host, &quiet(), &[], &mut 0.0, &mut []);
        assert_eq!(out.status, Status::Ok);
        assert_eq!(out.code(), 0);
        assert!(out.diagnostics.is_empty());
        assert_eq!(host.get(CONST_DERIV), 0);
        assert_eq!(host.get(HV_PROD), 0);
    }

    #[test]
    fn test_init_each_mismatch_single_diagnostic() {
        for (neq, nvar, nz, what) in [
            (3, 2, 2, "equations"),
            (2, 5, 2, "variables"),
            (2, 2, 0, "nonzero derivatives"),
        ] {
            let mut host = host(Mode::Init);
            host.set_problem(neq, nvar, nz);
            let mut module = Squares::default();
            let out = run(
                &mut module,
                &mut host,
                &KernelConfig::default(),
                &[],
                &mut 0.0,
                &mut [],
            );
            assert_eq!(out.status, Status::Fatal);
            assert_eq!(out.diagnostics.len(), 1);
            let recs = texts(&mut host);
            assert_eq!(recs.len(), 1, "exactly one record for {what}");
            assert_eq!(recs[0].0, Some(Destination::Log));
            assert!(recs[0].1.contains(what));
        }
    }

    #[test]
    fn test_init_negative_size_is_mismatch() {
        let mut host = host(Mode::Init);
        host.set_problem(-2, 2, 2);
        let out = run(
            &mut Squares::default(),
            &mut host,
            &quiet(),
            &[],
            &mut 0.0,
            &mut [],
        );
        assert_eq!(out.status, Status::Fatal);
    }

    #[test]
    fn test_init_announces_correct_size() {
        let mut host = host(Mode::Init);
        let out = run(
            &mut Squares::default(),
            &mut host,
            &KernelConfig::default(),
            &[],
            &mut 0.0,
            &mut [],
        );
        assert!(out.status.is_ok());
        assert_eq!(
            texts(&mut host),
            vec![(
                Some(Destination::Log),
                "--- Model has the correct size.".to_string()
            )]
        );
    }

    #[test]
    fn test_evaluate_function_only() {
        let mut host = host(Mode::Evaluate);
        host.set_request(2, true, false);
        let mut f = -1.0;
        let mut d = [7.0, 7.0];
        let out = run(
            &mut Squares::default(),
            &mut host,
            &quiet(),
            &[1.0, 3.0],
            &mut f,
            &mut d,
        );
        assert_eq!(out.status, Status::Ok);
        assert!((f - 9.0).abs() < 1e-12);
        assert_eq!(d, [7.0, 7.0]);
    }

    #[test]
    fn test_evaluate_derivatives_only() {
        let mut host = host(Mode::Evaluate);
        host.set_request(1, false, true);
        let mut f = -1.0;
        let mut d = [0.0, 0.0];
        run(
            &mut Squares::default(),
            &mut host,
            &quiet(),
            &[1.5, 3.0],
            &mut f,
            &mut d,
        );
        assert_eq!(f, -1.0);
        assert_eq!(d, [3.0, 0.0]);
    }

    #[test]
    fn test_evaluate_index_out_of_range() {
        for index in [0, 3, -1] {
            let mut host = host(Mode::Evaluate);
            host.set_request(index, true, true);
            let mut f = 5.0;
            let mut d = [1.0, 1.0];
            let out = run(
                &mut Squares::default(),
                &mut host,
                &quiet(),
                &[1.0, 1.0],
                &mut f,
                &mut d,
            );
            assert_eq!(out.status, Status::Fatal);
            assert_eq!(f, 5.0);
            let dests: Vec<_> = texts(&mut host).into_iter().map(|(d, _)| d).collect();
            assert!(dests.contains(&Some(Destination::Status)));
            assert!(dests.contains(&Some(Destination::Log)));
        }
    }

    #[test]
    fn test_evaluation_error_is_recoverable() {
        let mut host = host(Mode::Evaluate);
        host.set_request(1, true, false);
        let out = run(
            &mut Squares::default(),
            &mut host,
            &quiet(),
            &[-1.0, 0.0],
            &mut 0.0,
            &mut [0.0, 0.0],
        );
        assert_eq!(out.status, Status::EvalError);
        assert_eq!(out.code(), 1);
    }

    #[test]
    fn test_evaluate_short_arrays_fatal() {
        let mut host = host(Mode::Evaluate);
        host.set_request(1, true, false);
        let out = run(
            &mut Squares::default(),
            &mut host,
            &quiet(),
            &[1.0],
            &mut 0.0,
            &mut [0.0],
        );
        assert_eq!(out.status, Status::Fatal);
    }

    #[test]
    fn test_unknown_mode() {
        let mut host = host(Mode::Init);
        host.set_mode_code(42);
        let out = run(
            &mut Squares::default(),
            &mut host,
            &KernelConfig::default(),
            &[],
            &mut 0.0,
            &mut [],
        );
        assert_eq!(out.mode, None);
        assert_eq!(out.status, Status::Fatal);
        let recs = texts(&mut host);
        assert_eq!(recs.len(), 2);
        assert!(recs.iter().all(|(_, t)| t.contains("mode 42")));
        let dests: Vec<_> = recs.iter().map(|(d, _)| *d).collect();
        assert!(dests.contains(&Some(Destination::Log)));
        assert!(dests.contains(&Some(Destination::Status)));
    }

    #[test]
    fn test_optional_modes_unsupported_by_default() {
        for mode in [Mode::ConstantDerivative, Mode::HessianVectorProduct] {
            let mut host = host(mode);
            host.set_request(1, false, false);
            let mut d = [0.25, 0.5];
            let out = run(
                &mut Squares::default(),
                &mut host,
                &quiet(),
                &[1.0, 1.0],
                &mut 0.0,
                &mut d,
            );
            assert_eq!(out.status, Status::Fatal);
            assert_eq!(d, [0.25, 0.5]);
        }
    }

    #[test]
    fn test_terminate() {
        let mut host = host(Mode::Terminate);
        let mut module = Squares::default();
        let out = run(
            &mut module,
            &mut host,
            &KernelConfig::default(),
            &[],
            &mut 0.0,
            &mut [],
        );
        assert!(out.status.is_ok());
        assert!(module.terminated);
        let lines: Vec<String> = texts(&mut host).into_iter().map(|(_, t)| t).collect();
        assert_eq!(lines, vec!["--- Terminating", "bye"]);
    }

    #[test]
    fn test_string_request_then_delivery() {
        let mut module = Squares {
            want_string: true,
            ..Default::default()
        };
        let mut host = host(Mode::Init);
        run(&mut module, &mut host, &quiet(), &[], &mut 0.0, &mut []);
        assert_eq!(host.get(gext_types::layout::GETFIL), StringKind::WorkDir.id());

        host.begin_call();
        host.deposit_string("/work/dir").unwrap();
        let out = run(&mut module, &mut host, &quiet(), &[], &mut 0.0, &mut []);
        assert!(out.status.is_ok());
        assert_eq!(
            module.received,
            Some((Some(StringKind::WorkDir), "/work/dir".to_string()))
        );
        assert_eq!(host.get(gext_types::layout::GETFIL), 0);
    }

    #[test]
    fn test_debug_trace_through_dispatcher() {
        let sink = MemorySink::new();
        let dispatcher = Dispatcher::new(&sink, &KernelConfig::default());
        let mut host = host(Mode::Evaluate);
        host.set_request(9, true, false);
        host.set_debug(true);
        let mut cv = host.view().unwrap();
        dispatcher.dispatch(&mut Squares::default(), &mut cv, &[0.0, 0.0], &mut 0.0, &mut [0.0, 0.0]);
        let lines = sink.lines();
        assert_eq!(lines[0], " Log: --- Evaluation mode");
        assert!(lines[1].starts_with(" Log:  ** equation index 9"));
        assert!(lines[2].starts_with("Stat:  ** equation index 9"));
    }
}
