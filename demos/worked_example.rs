//! The worked example: `d = a * b + c`, printed before and after the backward pass.

use tapegrad::Tape;

fn main() {
    env_logger::init();

    let tape = Tape::new();
    let a = tape.term("a", 2.);
    let b = tape.term("b", -3.);
    let c = tape.term("c", 10.);

    let d = a * b + c;
    println!("{d}");

    d.backward();

    for term in [a, b, c, d] {
        println!("{}: {term}", term.name());
    }
}
