use std::fmt::{self, Write};

use super::Instruction;

/// Where the simulation stands while lowering a branch or a loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowState {
    ConditionEval,
    BranchTaken,
    BranchNotTaken,
    Iterating,
    Exit,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FlowState::ConditionEval => "CONDITION_EVAL",
            FlowState::BranchTaken => "BRANCH_TAKEN",
            FlowState::BranchNotTaken => "BRANCH_NOT_TAKEN",
            FlowState::Iterating => "ITERATING",
            FlowState::Exit => "EXIT",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TraceEvent {
    Step {
        number: usize,
        instruction: Instruction,
        description: String,
    },
    /// Block boundary such as `IF STATEMENT` or `END WHILE`.
    Marker(String),
    /// Value produced by the previous steps.
    Note(String),
    Flow(FlowState),
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEvent::Step {
                number,
                instruction,
                description,
            } => write!(
                f,
                "Step {}: {:<40} # {}",
                number,
                instruction.to_string(),
                description
            ),
            TraceEvent::Marker(text) => write!(f, "# --- {} ---", text),
            TraceEvent::Note(text) => write!(f, "         >> {}", text),
            TraceEvent::Flow(state) => write!(f, "#   [{}]", state),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Trace {
    events: Vec<TraceEvent>,
    steps: usize,
}

impl Trace {
    pub fn step(&mut self, instruction: Instruction, description: impl Into<String>) {
        self.steps += 1;
        self.events.push(TraceEvent::Step {
            number: self.steps,
            instruction,
            description: description.into(),
        });
    }

    pub fn marker(&mut self, text: impl Into<String>) {
        self.events.push(TraceEvent::Marker(text.into()));
    }

    pub fn note(&mut self, text: impl Into<String>) {
        self.events.push(TraceEvent::Note(text.into()));
    }

    pub fn flow(&mut self, state: FlowState) {
        self.events.push(TraceEvent::Flow(state));
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn step_count(&self) -> usize {
        self.steps
    }

    pub fn contains_marker(&self, text: &str) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, TraceEvent::Marker(m) if m == text))
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for event in &self.events {
            let _ = writeln!(out, "{}", event);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::Reg;

    #[test]
    fn steps_are_numbered_and_padded() {
        let mut trace = Trace::default();
        trace.marker("WHILE LOOP");
        trace.step(Instruction::Push(Reg::Rax), "save left operand (3)");
        trace.note("rax = 3");
        trace.step(Instruction::Ret, "return");

        let rendered = trace.render();
        let lines: Vec<_> = rendered.lines().collect();
        assert_eq!(lines[0], "# --- WHILE LOOP ---");
        assert_eq!(
            lines[1],
            format!("Step 1: {:<40} # save left operand (3)", "pushq %rax")
        );
        assert_eq!(lines[2], "         >> rax = 3");
        assert!(lines[3].starts_with("Step 2: ret "));
        assert_eq!(trace.step_count(), 2);
    }
}
