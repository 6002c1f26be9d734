/// The path of node identifiers from the traversal root to the current node.
///
/// Each recursive step owns its own chain, so sibling branches never see each
/// other's nodes.
pub type ReferenceChain = Vec<String>;

/// True when `candidate` already appears on the current path.
///
/// This is path based: two independent branches may both reach the same node
/// without that being reported as a cycle.
pub fn would_create_circular_reference<S: AsRef<str>>(chain: &[S], candidate: &str) -> bool {
    chain.iter().any(|node| node.as_ref() == candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_on_path_is_circular() {
        assert!(would_create_circular_reference(&["A", "B"], "A"));
        assert!(would_create_circular_reference(&["A", "B"], "B"));
        assert!(!would_create_circular_reference(&["A", "B"], "C"));
    }

    #[test]
    fn test_empty_chain_never_circular() {
        let chain: ReferenceChain = Vec::new();
        assert!(!would_create_circular_reference(&chain, "Patient/A"));
    }
}
