use std::collections::BTreeMap;
use std::io::{BufRead, IsTerminal, Write};

/// Asks the user for values of required keys.
pub trait Prompter {
    /// Returns values for as many of `keys` as could be obtained.
    ///
    /// Keys left out of the result stay unresolved; the sync engine reports them.
    fn prompt(&self, registry: &str, keys: &[String]) -> std::io::Result<BTreeMap<String, String>>;
}

/// Never asks; used for `--no-prompt` and non-interactive runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrompt;

impl Prompter for NoPrompt {
    fn prompt(&self, _registry: &str, _keys: &[String]) -> std::io::Result<BTreeMap<String, String>> {
        Ok(BTreeMap::new())
    }
}

/// Reads one line per key from stdin. Does nothing when stdin is not a terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompter;

impl Prompter for StdinPrompter {
    fn prompt(&self, registry: &str, keys: &[String]) -> std::io::Result<BTreeMap<String, String>> {
        let stdin = std::io::stdin();
        if !stdin.is_terminal() {
            return Ok(BTreeMap::new());
        }
        let mut stderr = std::io::stderr();
        let mut values = BTreeMap::new();
        for key in keys {
            write!(stderr, "[{registry}] value for {key}: ")?;
            stderr.flush()?;
            let mut line = String::new();
            stdin.lock().read_line(&mut line)?;
            let value = line.trim();
            if !value.is_empty() {
                values.insert(key.clone(), value.to_string());
            }
        }
        Ok(values)
    }
}

/// Answers from a fixed map; handy for tests and scripted runs.
#[derive(Debug, Default, Clone)]
pub struct FixedValues(pub BTreeMap<String, String>);

impl Prompter for FixedValues {
    fn prompt(&self, _registry: &str, keys: &[String]) -> std::io::Result<BTreeMap<String, String>> {
        Ok(keys
            .iter()
            .filter_map(|key| self.0.get(key).map(|value| (key.clone(), value.clone())))
            .collect())
    }
}
