//! Implementation of shared memory arena for the terms, aka a tape.
//! See https://rufflewind.com/2016-12-30/reverse-mode-automatic-differentiation
//!
//! Every node is evaluated eagerly when it is pushed to the tape, so a node's
//! `data` never changes afterwards. Only `grad` is mutated, by
//! [`TapeTerm::backward`] and the `zero_grad` family.

use std::{
    cell::{Ref, RefCell},
    fmt::{self, Display},
    ops::{Add, Div, Mul, Neg, Sub},
};

use log::{debug, trace};

use crate::dot::DotBuilder;

#[derive(Default, Debug)]
pub struct Tape {
    nodes: RefCell<Vec<TapeNode>>,
}

/// A scalar value recorded on a [`Tape`], together with its accumulated gradient.
#[derive(Clone, Debug)]
pub struct TapeNode {
    name: String,
    value: TapeValue,
    data: f64,
    grad: f64,
}

/// The operation that produced a node. Operands are indices into the same tape,
/// always smaller than the index of the node itself.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum TapeValue {
    Value(f64),
    Add(u32, u32),
    Mul(u32, u32),
    Pow(u32, f64),
    Relu(u32),
}

impl TapeValue {
    pub(crate) fn operands(&self) -> Vec<u32> {
        use TapeValue::*;
        match *self {
            Value(_) => vec![],
            Add(lhs, rhs) | Mul(lhs, rhs) => vec![lhs, rhs],
            Pow(term, _) | Relu(term) => vec![term],
        }
    }

    fn op_label(&self) -> String {
        use TapeValue::*;
        match self {
            Value(_) => String::new(),
            Add(..) => "+".to_string(),
            Mul(..) => "*".to_string(),
            Pow(_, p) => format!("**{p:.6}"),
            Relu(_) => "ReLU".to_string(),
        }
    }
}

impl TapeNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> f64 {
        self.data
    }

    pub fn grad(&self) -> f64 {
        self.grad
    }

    /// Label of the producing operation, empty for leaves.
    pub fn op_label(&self) -> String {
        self.value.op_label()
    }

    /// Indices of the operands in the owning tape.
    pub fn operands(&self) -> Vec<u32> {
        self.value.operands()
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.value, TapeValue::Value(_))
    }
}

impl Display for TapeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value = {}, grad = {}", self.data, self.grad)?;
        let label = self.op_label();
        if !label.is_empty() {
            write!(f, "\nop= {label}")?;
        }
        Ok(())
    }
}

/// A handle to a node in a [`Tape`]. It is cheap to copy and cannot outlive the tape.
#[derive(Copy, Clone)]
pub struct TapeTerm<'a> {
    tape: &'a Tape,
    idx: u32,
}

impl Tape {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a named leaf.
    pub fn term<'a>(&'a self, name: impl Into<String>, init: f64) -> TapeTerm<'a> {
        self.push(Some(name.into()), TapeValue::Value(init))
    }

    /// Creates an anonymous leaf, e.g. a constant.
    pub fn value<'a>(&'a self, init: f64) -> TapeTerm<'a> {
        self.push(None, TapeValue::Value(init))
    }

    pub fn add<'a>(&'a self, lhs: TapeTerm<'a>, rhs: TapeTerm<'a>) -> TapeTerm<'a> {
        self.check_owned(lhs);
        self.check_owned(rhs);
        self.push(None, TapeValue::Add(lhs.idx, rhs.idx))
    }

    pub fn mul<'a>(&'a self, lhs: TapeTerm<'a>, rhs: TapeTerm<'a>) -> TapeTerm<'a> {
        self.check_owned(lhs);
        self.check_owned(rhs);
        self.push(None, TapeValue::Mul(lhs.idx, rhs.idx))
    }

    /// Raises `term` to a constant exponent. The exponent is not a node and gets no gradient.
    pub fn pow<'a>(&'a self, term: TapeTerm<'a>, exponent: f64) -> TapeTerm<'a> {
        self.check_owned(term);
        self.push(None, TapeValue::Pow(term.idx, exponent))
    }

    pub fn relu<'a>(&'a self, term: TapeTerm<'a>) -> TapeTerm<'a> {
        self.check_owned(term);
        self.push(None, TapeValue::Relu(term.idx))
    }

    pub fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.borrow().is_empty()
    }

    /// Resets the gradient of every node on the tape, reachable or not.
    pub fn zero_grad(&self) {
        let mut nodes = self.nodes.borrow_mut();
        debug!("zero_grad: resetting {} nodes", nodes.len());
        for node in nodes.iter_mut() {
            node.grad = 0.;
        }
    }

    /// Drops every node at once. Requires that no [`TapeTerm`] is alive.
    pub fn clear(&mut self) {
        let nodes = self.nodes.get_mut();
        debug!("clear: dropping {} nodes", nodes.len());
        nodes.clear();
    }

    pub(crate) fn nodes(&self) -> Ref<Vec<TapeNode>> {
        self.nodes.borrow()
    }

    fn check_owned(&self, term: TapeTerm) {
        assert!(
            std::ptr::eq(self, term.tape),
            "term {} belongs to a different tape",
            term.idx
        );
    }

    fn push<'a>(&'a self, name: Option<String>, value: TapeValue) -> TapeTerm<'a> {
        let mut nodes = self.nodes.borrow_mut();
        let idx = nodes.len();
        let data = forward(&nodes, value);
        let name = name.unwrap_or_else(|| auto_name(&nodes, idx, value));
        nodes.push(TapeNode {
            name,
            value,
            data,
            grad: 0.,
        });
        TapeTerm {
            tape: self,
            idx: idx as u32,
        }
    }
}

fn forward(nodes: &[TapeNode], value: TapeValue) -> f64 {
    use TapeValue::*;
    let data = |idx: u32| nodes[idx as usize].data;
    match value {
        Value(val) => val,
        Add(lhs, rhs) => data(lhs) + data(rhs),
        Mul(lhs, rhs) => data(lhs) * data(rhs),
        Pow(term, p) => data(term).powf(p),
        // NaN is not less than zero, so it passes through.
        Relu(term) => {
            let x = data(term);
            if x < 0. {
                0.
            } else {
                x
            }
        }
    }
}

#[cfg(not(feature = "expr_name"))]
fn auto_name(_nodes: &[TapeNode], idx: usize, _value: TapeValue) -> String {
    format!("a{idx}")
}

/// Names an intermediate node after the expression that produced it.
/// It can consume a lot of memory in large graphs.
#[cfg(feature = "expr_name")]
fn auto_name(nodes: &[TapeNode], _idx: usize, value: TapeValue) -> String {
    use TapeValue::*;
    let name = |idx: u32| nodes[idx as usize].name.clone();
    match value {
        Value(val) => format!("{val}"),
        Add(lhs, rhs) => format!("({} + {})", name(lhs), name(rhs)),
        Mul(lhs, rhs) => format!("{} * {}", name(lhs), name(rhs)),
        Pow(term, p) => format!("{}^{p}", name(term)),
        Relu(term) => format!("relu({})", name(term)),
    }
}

/// Post-order depth-first traversal from `root`: operands come before the nodes
/// consuming them, and every reachable node appears exactly once.
pub(crate) fn topo_sort(nodes: &[TapeNode], root: u32) -> Vec<u32> {
    let mut visited = vec![false; nodes.len()];
    let mut topo = vec![];
    let mut stack = vec![root];

    // The stack holds the current path; a node is re-pushed below its first
    // unvisited operand and emitted once all operands are done.
    while let Some(idx) = stack.pop() {
        if visited[idx as usize] {
            continue;
        }
        let pending = nodes[idx as usize]
            .value
            .operands()
            .into_iter()
            .find(|&operand| !visited[operand as usize]);
        match pending {
            Some(operand) => {
                stack.push(idx);
                stack.push(operand);
            }
            None => {
                visited[idx as usize] = true;
                topo.push(idx);
            }
        }
    }
    topo
}

/// Adds the contribution of node `idx` to the gradients of its operands.
fn backward_rule(nodes: &mut [TapeNode], idx: u32) {
    use TapeValue::*;
    let TapeNode {
        value, data, grad, ..
    } = nodes[idx as usize];
    match value {
        Value(_) => (),
        Add(lhs, rhs) => {
            nodes[lhs as usize].grad += grad;
            nodes[rhs as usize].grad += grad;
        }
        Mul(lhs, rhs) => {
            let (lhs_data, rhs_data) = (nodes[lhs as usize].data, nodes[rhs as usize].data);
            nodes[lhs as usize].grad += rhs_data * grad;
            nodes[rhs as usize].grad += lhs_data * grad;
        }
        Pow(term, p) => {
            let x = nodes[term as usize].data;
            nodes[term as usize].grad += p * x.powf(p - 1.) * grad;
        }
        // Strict comparison: the subgradient at the kink is 0.
        Relu(term) => {
            let slope = if data > 0. { 1. } else { 0. };
            nodes[term as usize].grad += slope * grad;
        }
    }
}

impl<'a> TapeTerm<'a> {
    pub fn idx(&self) -> u32 {
        self.idx
    }

    pub fn tape(&self) -> &'a Tape {
        self.tape
    }

    pub fn name(&self) -> String {
        self.node(|node| node.name.clone())
    }

    pub fn data(&self) -> f64 {
        self.node(|node| node.data)
    }

    pub fn grad(&self) -> f64 {
        self.node(|node| node.grad)
    }

    pub fn op_label(&self) -> String {
        self.node(|node| node.op_label())
    }

    pub fn is_leaf(&self) -> bool {
        self.node(|node| node.is_leaf())
    }

    /// The terms this one was computed from, in construction order.
    pub fn operands(&self) -> Vec<TapeTerm<'a>> {
        self.node(|node| node.operands())
            .into_iter()
            .map(|idx| self.with_idx(idx))
            .collect()
    }

    pub fn pow(self, exponent: f64) -> Self {
        self.tape.pow(self, exponent)
    }

    pub fn relu(self) -> Self {
        self.tape.relu(self)
    }

    /// Every term reachable from this one, operands first and this term last.
    pub fn topo_order(&self) -> Vec<TapeTerm<'a>> {
        let nodes = self.nodes();
        topo_sort(&nodes, self.idx)
            .into_iter()
            .map(|idx| self.with_idx(idx))
            .collect()
    }

    /// Accumulates the gradient of this term into every term reachable from it.
    ///
    /// Gradients are not cleared beforehand, so calling this twice adds up. Use
    /// [`TapeTerm::zero_grad`] or [`Tape::zero_grad`] to start over.
    pub fn backward(&self) {
        self.backward_cb(&|_: &[TapeNode], _| ());
    }

    /// Same as [`TapeTerm::backward`], but calls `callback` after each node has
    /// propagated its gradient. The tape is borrowed during the call, so the
    /// callback gets the nodes directly. Reading a term of the same tape
    /// (`grad()`, `data()`, `Display`, ...) inside the callback panics.
    pub fn backward_cb(&self, callback: &impl Fn(&[TapeNode], u32)) {
        let mut nodes = self.tape.nodes.borrow_mut();
        let topo = topo_sort(&nodes, self.idx);
        debug!(
            "backward from {}: {} reachable nodes",
            nodes[self.idx as usize].name,
            topo.len()
        );
        nodes[self.idx as usize].grad = 1.;
        for &idx in topo.iter().rev() {
            backward_rule(&mut nodes, idx);
            trace!(
                "backward {idx} ({}): grad = {}",
                nodes[idx as usize].op_label(),
                nodes[idx as usize].grad
            );
            callback(nodes.as_slice(), idx);
        }
        debug!("backward from {} done", nodes[self.idx as usize].name);
    }

    /// Resets the gradient of every term reachable from this one.
    pub fn zero_grad(&self) {
        let mut nodes = self.tape.nodes.borrow_mut();
        let topo = topo_sort(&nodes, self.idx);
        debug!("zero_grad: resetting {} reachable nodes", topo.len());
        for idx in topo {
            nodes[idx as usize].grad = 0.;
        }
    }

    pub fn dot_builder(&self) -> DotBuilder<'a> {
        DotBuilder::new(self.tape, self.idx)
    }

    fn node<T>(&self, f: impl FnOnce(&TapeNode) -> T) -> T {
        f(&self.nodes()[self.idx as usize])
    }

    fn nodes(&self) -> Ref<'a, Vec<TapeNode>> {
        self.tape.nodes.try_borrow().unwrap_or_else(|_| {
            panic!(
                "term {} read while a backward pass holds the tape; use the nodes given to the callback",
                self.idx
            )
        })
    }

    fn with_idx(&self, idx: u32) -> Self {
        Self {
            tape: self.tape,
            idx,
        }
    }
}

impl PartialEq for TapeTerm<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tape, other.tape) && self.idx == other.idx
    }
}

impl Display for TapeTerm<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.nodes()[self.idx as usize], f)
    }
}

impl fmt::Debug for TapeTerm<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("TapeTerm");
        s.field("idx", &self.idx);
        // The tape is mutably borrowed while a backward callback runs.
        if let Ok(nodes) = self.tape.nodes.try_borrow() {
            let node = &nodes[self.idx as usize];
            s.field("name", &node.name)
                .field("data", &node.data)
                .field("grad", &node.grad);
        }
        s.finish()
    }
}

impl<'a> Add for TapeTerm<'a> {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        self.tape.add(self, rhs)
    }
}

impl<'a> Mul for TapeTerm<'a> {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self::Output {
        self.tape.mul(self, rhs)
    }
}

impl<'a> Neg for TapeTerm<'a> {
    type Output = Self;
    fn neg(self) -> Self::Output {
        self * self.tape.value(-1.)
    }
}

impl<'a> Sub for TapeTerm<'a> {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        self + -rhs
    }
}

impl<'a> Div for TapeTerm<'a> {
    type Output = Self;
    fn div(self, rhs: Self) -> Self::Output {
        self * rhs.pow(-1.)
    }
}

/// Arithmetic with a plain `f64` on either side records the scalar as a constant leaf.
macro_rules! impl_scalar_op {
    ($trait:ident, $method:ident) => {
        impl<'a> $trait<f64> for TapeTerm<'a> {
            type Output = TapeTerm<'a>;
            fn $method(self, rhs: f64) -> Self::Output {
                self.$method(self.tape.value(rhs))
            }
        }

        impl<'a> $trait<TapeTerm<'a>> for f64 {
            type Output = TapeTerm<'a>;
            fn $method(self, rhs: TapeTerm<'a>) -> Self::Output {
                rhs.tape.value(self).$method(rhs)
            }
        }
    };
}

impl_scalar_op!(Add, add);
impl_scalar_op!(Sub, sub);
impl_scalar_op!(Mul, mul);
impl_scalar_op!(Div, div);
