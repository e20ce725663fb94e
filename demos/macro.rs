use tapegrad::Tape;
use tapegrad_macro::tapegrad;

fn main() {
    let tape = Tape::new();
    tapegrad!(tape, {
        let x = 123.;
        let result = 2. * x + 321.;
    });
    println!("f(x): {}", result.data());
    result.backward();
    println!("df/dx: {}", x.grad());
    result.dot_builder().dot(&mut std::io::stdout()).unwrap();
}
