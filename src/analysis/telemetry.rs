use serde::Serialize;

/// Counters collected over a single solve call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SolveStats {
    /// Variables in the discovered subgraph.
    pub visited: usize,
    /// Operations run on the scheduling thread.
    pub executed_inline: usize,
    /// Operations handed to the executor.
    pub dispatched: usize,
    /// New residual Variables appended to the graph.
    pub residuals: usize,
    /// Inputs left unbound.
    pub missing_inputs: usize,
    /// Cache entries dropped once their last consumer read them.
    pub released: usize,
}

impl SolveStats {
    pub fn executed(&self) -> usize {
        self.executed_inline + self.dispatched
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_serialize_all_counters() {
        let stats = SolveStats { visited: 4, executed_inline: 1, dispatched: 2, ..Default::default() };
        let json: serde_json::Value = serde_json::from_str(&stats.to_json()).unwrap();
        assert_eq!(json["visited"], 4);
        assert_eq!(json["dispatched"], 2);
        assert_eq!(json["residuals"], 0);
        assert_eq!(stats.executed(), 3);
    }
}
