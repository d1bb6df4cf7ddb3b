use indexmap::IndexMap;

use super::Reg;

/// Register file and variable values of the simulated machine.
#[derive(Clone, Debug, PartialEq)]
pub struct Machine {
    registers: IndexMap<Reg, i64>,
    variables: IndexMap<String, i64>,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    pub fn new() -> Self {
        Self {
            registers: Reg::TRACKED.iter().map(|&reg| (reg, 0)).collect(),
            variables: IndexMap::new(),
        }
    }

    pub fn get(&self, reg: Reg) -> i64 {
        self.registers.get(&reg).copied().unwrap_or(0)
    }

    pub fn set(&mut self, reg: Reg, value: i64) {
        self.registers.insert(reg, value);
    }

    pub fn registers(&self) -> impl Iterator<Item = (Reg, i64)> + '_ {
        self.registers.iter().map(|(&reg, &value)| (reg, value))
    }

    pub fn variable(&self, name: &str) -> Option<i64> {
        self.variables.get(name).copied()
    }

    pub fn set_variable(&mut self, name: &str, value: i64) {
        self.variables.insert(name.to_string(), value);
    }

    pub fn variables(&self) -> impl Iterator<Item = (&str, i64)> + '_ {
        self.variables.iter().map(|(name, &value)| (name.as_str(), value))
    }
}
