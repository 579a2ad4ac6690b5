//! Vector index implementations for episodic memory.
//!
//! `LanceVectorIndex` persists records in an embedded LanceDB table;
//! `InMemoryVectorIndex` keeps them in a concurrent map for ephemeral runs.
//! Arrow schemas define the table structure.

pub mod lance;
pub mod memory;
pub mod schema;

/// Cosine similarity; zero when either vector has zero length.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        (dot / (na * nb)) as f64
    }
}
