//! Dependency graph in diamond shape. It uses the same term twice, so the derivative should add up.
//! Writes one dot file per backward step, with the node just processed highlighted.

use tapegrad::{Tape, TapeNode};

fn main() -> std::io::Result<()> {
    let tape = Tape::new();
    let a = tape.term("a", 1.);
    let a2 = -a;
    let b = tape.term("b", 3.);
    let c = tape.term("c", 5.);
    let ab = a2 + b;
    let ac = a2 + c;
    let abac = ab + ac;

    let counter = std::cell::Cell::new(0);
    let callback = |nodes: &[TapeNode], idx| {
        let i = counter.get();
        let res = std::fs::File::create(format!("dot{i}.dot")).and_then(|file| {
            abac.dot_builder()
                .show_values(true)
                .highlights(idx)
                .dot_borrowed(nodes, &mut std::io::BufWriter::new(file))
        });
        if let Err(e) = res {
            eprintln!("dot{i}.dot: {e}");
        }
        counter.set(i + 1);
    };

    abac.backward_cb(&callback);
    println!("abac: {}", abac.grad());
    println!("a: {}", a.grad());
    println!("b: {}", b.grad());
    println!("c: {}", c.grad());
    abac.dot_builder()
        .show_values(true)
        .dot(&mut std::io::stdout())
}
