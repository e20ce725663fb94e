use tapegrad::Tape;
use tapegrad_macro::tapegrad;

#[test]
fn linear() {
    let tape = Tape::new();
    tapegrad!(tape, {
        let x = 123.;
        let result = 2. * x + 321.;
    });
    assert_eq!(result.data(), 567.);
    result.backward();
    assert_eq!(x.grad(), 2.);
    assert_eq!(x.name(), "x");
}

#[test]
fn worked_example() {
    let tape = Tape::new();
    tapegrad!(tape, {
        let a = 2.;
        let b = -3.;
        let c = 10;
        let d = a * b + c;
    });
    assert_eq!(d.data(), 4.);
    d.backward();
    assert_eq!(a.grad(), -3.);
    assert_eq!(b.grad(), 2.);
    assert_eq!(c.grad(), 1.);
}

#[test]
fn functions_and_parens() {
    let tape = Tape::new();
    tapegrad!(tape, {
        let x = 3.;
        let y = relu(-(x - 5.)) + pow(x, 2) / (x + 1.);
    });
    assert_eq!(y.data(), 2. + 9. / 4.);
    y.backward();
    // -1 + (2x(x + 1) - x^2) / (x + 1)^2
    assert!((x.grad() - (-1. + 15. / 16.)).abs() < 1e-12);
}

#[test]
fn reuses_existing_terms() {
    let tape = Tape::new();
    let w = tape.term("w", 0.5);
    tapegrad!(tape, {
        let x = 4.;
        let y = w * x * w;
    });
    y.backward();
    assert_eq!(w.grad(), 4.);
    assert_eq!(x.grad(), 0.25);
}
