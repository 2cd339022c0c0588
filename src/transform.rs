// Query reversal for prefix-indexed lookups: "www.example.com" -> "moc.elpmaxe.www".

/// Reverse a query name character by character, so names under the same domain
/// share a common prefix.
pub fn reverse_query(query: &str) -> String {
    query.chars().rev().collect()
}
