use tapegrad::Tape;

#[test]
fn main() {
    let tape = Tape::new();
    let a = tape.term("a", 1.);
    let b = tape.term("b", 3.);
    let c = tape.term("c", 5.);
    let ab = a + b;
    let ac = a + c;
    let abac = ab + ac;

    abac.backward();
    println!("abac: {abac:#?}");
    assert_eq!(a.grad(), 2.);
    assert_eq!(b.grad(), 1.);
    assert_eq!(c.grad(), 1.);
}

#[test]
fn shared_node_appears_once() {
    let tape = Tape::new();
    let a = tape.term("a", 1.);
    let a2 = -a;
    let b = tape.term("b", 3.);
    let c = tape.term("c", 5.);
    let abac = (a2 + b) + (a2 + c);

    let order = abac.topo_order();
    assert_eq!(order.iter().filter(|term| **term == a2).count(), 1);
    assert_eq!(order.iter().filter(|term| **term == a).count(), 1);
    assert_eq!(order.last(), Some(&abac));

    abac.backward();
    assert_eq!(a2.grad(), 2.);
    assert_eq!(a.grad(), -2.);
}
