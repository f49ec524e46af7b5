use rustc_hash::FxHashMap;

/// Token for the document node at the start of every path signature
pub const ROOT_TOKEN: &str = "{}";

/// Per-document path and value counters built by the extraction pipeline
#[derive(Debug, Default, Clone)]
pub struct PathCounters {
    /// Path signature (`{} doc title`, `{} doc @id`) -> occurrences
    pub paths: FxHashMap<String, u32>,
    pub element_names: FxHashMap<String, u32>,
    pub attribute_names: FxHashMap<String, u32>,
    /// (element QName, string value) in closing-tag order
    pub element_text: Vec<(String, String)>,
    /// (attribute QName, value) in document order
    pub attribute_text: Vec<(String, String)>,
    /// (path signature, value) for every element and attribute
    pub path_values: Vec<(String, String)>,
    /// All text content, space separated
    pub text: String,
}

impl PathCounters {
    pub fn count_path(&mut self, signature: &str) {
        *self.paths.entry(signature.to_string()).or_insert(0) += 1;
    }

    pub fn count_element(&mut self, name: &str) {
        *self.element_names.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn count_attribute(&mut self, name: &str) {
        *self.attribute_names.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn add_text(&mut self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        if !self.text.is_empty() {
            self.text.push(' ');
        }
        self.text.push_str(text);
    }

    /// Path signatures in a stable order, each repeated per occurrence
    pub fn path_occurrences(&self) -> Vec<&str> {
        let mut paths: Vec<(&str, u32)> = self.paths.iter().map(|(p, &n)| (p.as_str(), n)).collect();
        paths.sort_unstable();
        paths
            .into_iter()
            .flat_map(|(path, count)| std::iter::repeat_n(path, count as usize))
            .collect()
    }

    pub fn sorted_names(names: &FxHashMap<String, u32>) -> Vec<&str> {
        let mut names: Vec<&str> = names.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// A document after extraction
#[derive(Debug, Clone)]
pub struct MappedDocument {
    pub uri: String,
    pub source: String,
    pub counters: PathCounters,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_occurrences_repeat() {
        let mut counters = PathCounters::default();
        counters.count_path("{} a b");
        counters.count_path("{} a");
        counters.count_path("{} a b");
        assert_eq!(counters.path_occurrences(), vec!["{} a", "{} a b", "{} a b"]);
    }

    #[test]
    fn test_add_text_skips_blank() {
        let mut counters = PathCounters::default();
        counters.add_text("hello");
        counters.add_text("  \n ");
        counters.add_text("world");
        assert_eq!(counters.text, "hello world");
    }
}
