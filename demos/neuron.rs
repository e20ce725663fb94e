//! A single ReLU neuron `relu(w0 * x0 + w1 * x1 + b)` with a squared error loss.
//! The gradients from the backward pass are compared against finite differences.

use tapegrad::{check_grad, GradCheckConfig, Tape};

fn main() {
    env_logger::init();

    let tape = Tape::new();
    let x0 = tape.term("x0", 0.5);
    let x1 = tape.term("x1", -1.5);
    let w0 = tape.term("w0", 2.);
    let w1 = tape.term("w1", -0.75);
    let b = tape.term("b", 0.1);
    let target = 1.;

    let y = (w0 * x0 + w1 * x1 + b).relu();
    let loss = (y - target).pow(2.);
    loss.backward();

    println!("y = {}, loss = {}", y.data(), loss.data());
    for term in [w0, w1, b] {
        println!("d loss / d {} = {}", term.name(), term.grad());
    }

    let inputs = [x0.data(), x1.data(), w0.data(), w1.data(), b.data()];
    let res = check_grad(
        |_, v| ((v[2] * v[0] + v[3] * v[1] + v[4]).relu() - target).pow(2.),
        &inputs,
        &GradCheckConfig::default(),
    );
    match res {
        Ok(report) => println!("gradient check passed, max difference {}", report.max_abs_diff),
        Err(e) => println!("gradient check failed: {e}"),
    }
}
