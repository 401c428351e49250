// ─────────────────────────────────────────────────────────────────────
// External Equation Kernel — Packer and Dispatch Benchmarks
// ─────────────────────────────────────────────────────────────────────
//! Criterion benchmarks for the per-call hot path: packing lines into the
//! buffer and dispatching an Evaluate request.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use gext_core::{
    Dimensions, Dispatcher, EvalRequest, ExternalModule, MessagePacker, Messages, NullSink,
    OwnedControlVector,
};
use gext_types::{GextResult, KernelConfig, Mode};

struct Linear;

impl ExternalModule for Linear {
    fn dimensions(&self) -> Dimensions {
        Dimensions {
            equations: 1,
            variables: 8,
            nonzeros: 8,
        }
    }

    fn evaluate(
        &mut self,
        request: &EvalRequest,
        x: &[f64],
        f: &mut f64,
        d: &mut [f64],
        _messages: &mut Messages<'_, '_, '_>,
    ) -> GextResult<()> {
        if request.do_function {
            *f = x.iter().sum();
        }
        if request.do_derivatives {
            d.fill(1.0);
        }
        Ok(())
    }
}

// ── MessagePacker.append() ──────────────────────────────────────────

fn bench_pack_short_line(c: &mut Criterion) {
    let packer = MessagePacker::new(&NullSink);
    let mut host = OwnedControlVector::with_buffer(4096);
    c.bench_function("pack_short_line", |b| {
        b.iter(|| {
            host.begin_call();
            let mut cv = host.view().unwrap();
            packer.log(&mut cv, black_box("--- Evaluation mode"))
        })
    });
}

fn bench_pack_until_full(c: &mut Criterion) {
    let packer = MessagePacker::new(&NullSink);
    let mut host = OwnedControlVector::with_buffer(1024);
    let line = "x".repeat(300);
    c.bench_function("pack_until_full", |b| {
        b.iter(|| {
            host.begin_call();
            let mut cv = host.view().unwrap();
            for _ in 0..20 {
                packer.status(&mut cv, black_box(&line));
            }
        })
    });
}

// ── Dispatcher.dispatch() ───────────────────────────────────────────

fn bench_dispatch_evaluate(c: &mut Criterion) {
    let dispatcher = Dispatcher::new(&NullSink, &KernelConfig::default());
    let mut host = OwnedControlVector::with_buffer(256);
    host.set_problem(1, 8, 8);
    host.set_mode(Mode::Evaluate);
    host.set_request(1, true, true);
    let x = [0.5; 8];
    let mut d = [0.0; 8];
    let mut f = 0.0;
    let mut module = Linear;
    c.bench_function("dispatch_evaluate", |b| {
        b.iter(|| {
            host.begin_call();
            let mut cv = host.view().unwrap();
            dispatcher.dispatch(&mut module, &mut cv, black_box(&x), &mut f, &mut d)
        })
    });
}

criterion_group!(
    benches,
    bench_pack_short_line,
    bench_pack_until_full,
    bench_dispatch_evaluate,
);
criterion_main!(benches);
