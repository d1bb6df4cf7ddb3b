use std::fmt;

use crate::value::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Ty {
    Void,
    Int,
    Bool,
}

impl Ty {
    /// Size of a stack slot holding a value of this type. Every scalar
    /// occupies a full 8-byte slot so offsets stay aligned.
    pub fn sizeof(&self) -> usize {
        match self {
            Ty::Void => 0,
            Ty::Int | Ty::Bool => 8,
        }
    }

    /// Reinterprets a raw machine word as a value of this type.
    pub fn from_word(&self, word: i64) -> Option<Value> {
        match self {
            Ty::Void => None,
            Ty::Int => Some(Value::Int(word)),
            Ty::Bool => Some(Value::Bool(word != 0)),
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Ty::Void => "void",
            Ty::Int => "int",
            Ty::Bool => "bool",
        };
        f.write_str(name)
    }
}
