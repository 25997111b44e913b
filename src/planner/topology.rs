//! Static agent topology of a plan.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One agent participating in a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInstance {
    pub name: String,
    pub agent_id: String,
    /// Scope key the agent's output is written under.
    pub output_key: String,
    /// Scope keys handed to the agent as inputs.
    #[serde(default)]
    pub input_keys: Vec<String>,
}

impl AgentInstance {
    pub fn new(name: &str, agent_id: &str, output_key: &str) -> Self {
        Self {
            name: name.to_string(),
            agent_id: agent_id.to_string(),
            output_key: output_key.to_string(),
            input_keys: Vec::new(),
        }
    }

    pub fn with_inputs<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_keys = keys.into_iter().map(Into::into).collect();
        self
    }
}

/// Ordered set of agent instances with id and name indices built once.
///
/// When two instances share an id or a name, the first one in order wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Topology {
    agents: Vec<AgentInstance>,
    by_id: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
}

impl Topology {
    pub fn new(agents: Vec<AgentInstance>) -> Self {
        let mut by_id = HashMap::with_capacity(agents.len());
        let mut by_name = HashMap::with_capacity(agents.len());
        for (idx, agent) in agents.iter().enumerate() {
            by_id.entry(agent.agent_id.clone()).or_insert(idx);
            by_name.entry(agent.name.clone()).or_insert(idx);
        }
        Self {
            agents,
            by_id,
            by_name,
        }
    }

    pub fn agents(&self) -> &[AgentInstance] {
        &self.agents
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&AgentInstance> {
        self.agents.get(index)
    }

    /// Position of the agent matched by id first, then by name.
    pub fn index_of(&self, agent_id: Option<&str>, agent_name: &str) -> Option<usize> {
        agent_id
            .and_then(|id| self.by_id.get(id))
            .or_else(|| self.by_name.get(agent_name))
            .copied()
    }

    /// Finds an agent by id first, then by name.
    pub fn resolve(&self, agent_id: Option<&str>, agent_name: &str) -> Option<&AgentInstance> {
        self.index_of(agent_id, agent_name)
            .and_then(|idx| self.agents.get(idx))
    }

    /// Output key of the agent resolved by [`Topology::resolve`].
    pub fn output_key(&self, agent_id: Option<&str>, agent_name: &str) -> Option<&str> {
        self.resolve(agent_id, agent_name)
            .map(|agent| agent.output_key.as_str())
    }
}

impl From<Vec<AgentInstance>> for Topology {
    fn from(agents: Vec<AgentInstance>) -> Self {
        Self::new(agents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology() -> Topology {
        Topology::new(vec![
            AgentInstance::new("researcher", "r1", "research"),
            AgentInstance::new("writer", "w1", "draft"),
        ])
    }

    #[test]
    fn test_resolves_by_id() {
        let topology = topology();
        assert_eq!(topology.output_key(Some("w1"), "unknown"), Some("draft"));
    }

    #[test]
    fn test_falls_back_to_name_when_id_is_unknown() {
        let topology = topology();
        assert_eq!(topology.output_key(Some("gone"), "researcher"), Some("research"));
        assert_eq!(topology.output_key(None, "writer"), Some("draft"));
    }

    #[test]
    fn test_id_wins_over_name() {
        let topology = topology();
        // id points at the writer, name at the researcher
        assert_eq!(topology.output_key(Some("w1"), "researcher"), Some("draft"));
    }

    #[test]
    fn test_unknown_agent_resolves_to_none() {
        let topology = topology();
        assert!(topology.resolve(Some("x9"), "editor").is_none());
    }

    #[test]
    fn test_first_duplicate_wins() {
        let topology = Topology::new(vec![
            AgentInstance::new("writer", "w1", "first"),
            AgentInstance::new("writer", "w2", "second"),
        ]);
        assert_eq!(topology.output_key(None, "writer"), Some("first"));
        assert_eq!(topology.output_key(Some("w2"), "writer"), Some("second"));
    }
}
