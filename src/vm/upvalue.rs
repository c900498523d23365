//! Shared variable cells and closures.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::value::Value;

use super::proto::FunctionInfo;

/// A variable slot. Symbol tables hold cells so a closure that captures a
/// slot keeps observing (and making) writes to it after the frame is gone.
pub type Cell = Rc<RefCell<Value>>;

pub fn new_cell(value: Value) -> Cell {
    Rc::new(RefCell::new(value))
}

/// A function body paired with the cells it captured when it was created.
#[derive(Clone)]
pub struct Closure {
    pub info: Rc<FunctionInfo>,
    pub upvalues: Vec<Cell>,
}

impl Closure {
    pub fn new(info: Rc<FunctionInfo>, upvalues: Vec<Cell>) -> Self {
        Self { info, upvalues }
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<closure params={} upvalues={}>",
            self.info.params.len(),
            self.upvalues.len()
        )
    }
}
