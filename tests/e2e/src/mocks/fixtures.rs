//! Test Data Factory
//!
//! Provides utilities for generating realistic test data:
//! - Memories with entity mentions
//! - Batch generation for stress testing
//! - Pre-built scenarios for common test cases

use std::collections::HashMap;

use nodimus_core::Repository;

/// Factory for creating test data
///
/// # Example
///
/// ```rust,ignore
/// let repo = Repository::open(path)?;
///
/// // Create a single memory
/// let id = TestDataFactory::create_memory(&repo, "test content", &["Topic"]);
///
/// // Create a batch
/// let ids = TestDataFactory::create_batch(&repo, 100);
///
/// // Create a specific scenario
/// let scenario = TestDataFactory::create_search_scenario(&repo);
/// ```
pub struct TestDataFactory;

/// A pre-built set of memories
#[derive(Debug, Clone)]
pub struct TestScenario {
    /// Memory ids in insertion order
    pub memory_ids: Vec<i64>,
    pub description: String,
    pub metadata: HashMap<String, String>,
}

impl TestDataFactory {
    /// Create one memory; panics if the write fails
    pub fn create_memory(repo: &Repository, content: &str, entities: &[&str]) -> i64 {
        repo.add_memory(content, entities)
            .expect("Failed to add memory")
            .id
    }

    /// Create `count` memories with generated content and two topic entities each
    pub fn create_batch(repo: &Repository, count: usize) -> Vec<i64> {
        (0..count)
            .map(|i| {
                let content = format!("Memory {} about {}", i, Self::lorem_content(8, i));
                let entities = Self::topic_entities(2, i);
                let entities: Vec<&str> = entities.iter().map(String::as_str).collect();
                Self::create_memory(repo, &content, &entities)
            })
            .collect()
    }

    /// The capital-cities scenario: two memories, three entities, one edge
    pub fn create_geography_scenario(repo: &Repository) -> TestScenario {
        let paris = Self::create_memory(repo, "Paris is the capital of France", &["Paris", "France"]);
        let berlin =
            Self::create_memory(repo, "Berlin is the capital of Germany", &["Berlin", "Germany"]);

        let entities = repo.get_entities().expect("Failed to list entities");
        let id_of = |name: &str| {
            entities
                .iter()
                .find(|e| e.name == name)
                .map(|e| e.id)
                .expect("entity missing")
        };
        repo.add_relationship(id_of("Paris"), id_of("France"), "capital_of")
            .expect("Failed to add relationship");

        let mut metadata = HashMap::new();
        metadata.insert("entities".to_string(), "4".to_string());
        metadata.insert("relationships".to_string(), "1".to_string());

        TestScenario {
            memory_ids: vec![paris, berlin],
            description: "Capital cities with one capital_of edge".to_string(),
            metadata,
        }
    }

    /// Create a scenario for testing search
    pub fn create_search_scenario(repo: &Repository) -> TestScenario {
        let mut ids = Vec::new();
        let mut metadata = HashMap::new();

        for content in [
            "Rust programming language uses ownership for memory safety",
            "Python is great for data science and machine learning",
            "JavaScript runs in web browsers and Node.js",
        ] {
            ids.push(Self::create_memory(repo, content, &["programming"]));
        }
        metadata.insert("programming_count".to_string(), "3".to_string());

        for content in [
            "Mitochondria is the powerhouse of the cell",
            "DNA contains genetic information",
            "Gravity is the force of attraction between masses",
        ] {
            ids.push(Self::create_memory(repo, content, &["science"]));
        }
        metadata.insert("science_count".to_string(), "3".to_string());

        for content in [
            "To make pasta, boil water and add salt",
            "Chocolate cake requires cocoa powder and eggs",
        ] {
            ids.push(Self::create_memory(repo, content, &["cooking"]));
        }
        metadata.insert("recipe_count".to_string(), "2".to_string());

        TestScenario {
            memory_ids: ids,
            description: "Search scenario with categorized content".to_string(),
            metadata,
        }
    }

    /// Generate lorem ipsum-like content
    pub fn lorem_content(words: usize, seed: usize) -> String {
        const WORDS: [&str; 20] = [
            "the", "memory", "learning", "knowledge", "algorithm",
            "data", "system", "process", "function", "method",
            "class", "object", "variable", "constant", "type",
            "structure", "pattern", "design", "architecture", "code",
        ];

        (0..words)
            .map(|i| WORDS[(seed + i * 7) % WORDS.len()])
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Entity names drawn from a fixed pool, so batches share entities
    pub fn topic_entities(count: usize, seed: usize) -> Vec<String> {
        const TOPICS: [&str; 10] = [
            "Rust", "SQLite", "Search", "Graph", "Snapshot",
            "Index", "Entity", "Memory", "Schema", "Query",
        ];

        (0..count)
            .map(|i| TOPICS[(seed + i) % TOPICS.len()].to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_repo() -> (Repository, TempDir) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::open(dir.path().join("test.db")).unwrap();
        (repo, dir)
    }

    #[test]
    fn test_create_memory() {
        let (repo, _dir) = create_test_repo();
        let id = TestDataFactory::create_memory(&repo, "test content", &[]);

        assert_eq!(repo.get_memory(id).unwrap(), "test content");
    }

    #[test]
    fn test_create_batch_shares_entities() {
        let (repo, _dir) = create_test_repo();
        let ids = TestDataFactory::create_batch(&repo, 25);

        assert_eq!(ids.len(), 25);
        assert_eq!(repo.stats().unwrap().memories, 25);
        // Pool of ten topics
        assert_eq!(repo.get_entities().unwrap().len(), 10);
    }

    #[test]
    fn test_geography_scenario() {
        let (repo, _dir) = create_test_repo();
        let scenario = TestDataFactory::create_geography_scenario(&repo);

        assert_eq!(scenario.memory_ids, vec![1, 2]);
        assert_eq!(repo.get_entities().unwrap().len(), 4);
        assert_eq!(repo.get_relationships().unwrap().len(), 1);
    }

    #[test]
    fn test_lorem_content() {
        let content = TestDataFactory::lorem_content(10, 42);
        assert_eq!(content.split_whitespace().count(), 10);
    }

    #[test]
    fn test_topic_entities() {
        let topics = TestDataFactory::topic_entities(3, 9);
        assert_eq!(topics, vec!["Query", "Rust", "SQLite"]);
    }
}
