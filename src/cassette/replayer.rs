//! Serves recorded interactions back in order.

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;

use super::format::{Cassette, Interaction};

/// Pending interactions of a cassette, one FIFO queue per `port::method`.
///
/// GETs and POSTs are replayed independently, so a cassette stays valid as
/// long as each method sees its requests in the recorded order.
#[derive(Debug)]
pub struct CassetteReplayer {
    name: String,
    queues: BTreeMap<(String, String), VecDeque<Interaction>>,
    served: BTreeMap<(String, String), usize>,
}

impl CassetteReplayer {
    /// Queue up every interaction of `cassette`.
    #[must_use]
    pub fn new(cassette: Cassette) -> Self {
        let mut queues: BTreeMap<(String, String), VecDeque<Interaction>> = BTreeMap::new();
        let mut interactions = cassette.interactions;
        interactions.sort_by_key(|i| i.seq);
        for interaction in interactions {
            let key = (interaction.port.clone(), interaction.method.clone());
            queues.entry(key).or_default().push_back(interaction);
        }
        Self { name: cassette.name, queues, served: BTreeMap::new() }
    }

    /// Read and parse a YAML cassette.
    ///
    /// # Errors
    ///
    /// Returns a message naming the file if it cannot be read or parsed.
    pub fn open(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read cassette file {}: {e}", path.display()))?;
        let cassette: Cassette = serde_yaml::from_str(&content)
            .map_err(|e| format!("Failed to parse cassette file {}: {e}", path.display()))?;
        log::debug!(
            "loaded cassette {:?} ({} interactions, commit {})",
            cassette.name,
            cassette.interactions.len(),
            cassette.commit
        );
        Ok(Self::new(cassette))
    }

    /// Interactions not yet served.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    /// Take the next interaction recorded for `port` and `method`.
    ///
    /// # Errors
    ///
    /// Returns a message when the pair was never recorded (listing the pairs
    /// that were) or when all of its interactions have been served.
    pub fn next_interaction(&mut self, port: &str, method: &str) -> Result<Interaction, String> {
        let key = (port.to_string(), method.to_string());
        let Some(queue) = self.queues.get_mut(&key) else {
            let recorded: Vec<String> =
                self.queues.keys().map(|(p, m)| format!("{p}::{m}")).collect();
            return Err(format!(
                "cassette {:?} has no interactions recorded for {port}::{method}; recorded: [{}]",
                self.name,
                recorded.join(", ")
            ));
        };
        let served = self.served.entry(key).or_insert(0);
        match queue.pop_front() {
            Some(interaction) => {
                *served += 1;
                Ok(interaction)
            }
            None => Err(format!(
                "cassette {:?} exhausted: all {served} {port}::{method} interactions have been served",
                self.name
            )),
        }
    }
}
