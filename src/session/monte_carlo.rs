use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::Rng;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Result of a Monte-Carlo sampling round: the selected sub-queries in draw
/// order plus the weight each one carried, so TOC nodes can record why a
/// branch exists.
#[derive(Debug, Clone, Default)]
pub struct MonteCarloOutcome {
    pub selected: Vec<String>,
    pub weights: HashMap<String, f32>,
    pub avg_candidate_score: f32,
    pub avg_selected_score: f32,
}

impl MonteCarloOutcome {
    pub fn is_selected(&self, query: &str) -> bool {
        self.weights.contains_key(query)
    }

    pub fn weight_of(&self, query: &str) -> f32 {
        self.weights.get(query).copied().unwrap_or(0.0)
    }
}

/// Weighted random selection with replacement over scored sub-queries.
///
/// When no candidate carries a positive weight the candidates are returned
/// unmodified. The RNG is caller-owned so tests can seed it.
pub fn sample_subqueries<R: Rng>(
    rng: &mut R,
    scored: &[(String, f32)],
    max_samples: usize,
) -> MonteCarloOutcome {
    if scored.is_empty() || max_samples == 0 {
        return MonteCarloOutcome::default();
    }

    let avg_candidate_score =
        scored.iter().map(|(_, s)| *s).sum::<f32>() / scored.len() as f32;

    let weights: Vec<f32> = scored.iter().map(|(_, s)| s.max(0.0)).collect();
    if weights.iter().all(|w| *w <= 0.0) {
        warn!("no positive sub-query weights; keeping all candidates");
        let mut outcome = MonteCarloOutcome {
            selected: scored.iter().map(|(q, _)| q.clone()).collect(),
            weights: scored.iter().cloned().collect(),
            avg_candidate_score,
            avg_selected_score: avg_candidate_score,
        };
        outcome.selected.dedup();
        return outcome;
    }

    let dist = match WeightedIndex::new(&weights) {
        Ok(d) => d,
        Err(e) => {
            warn!("weighted sampling unavailable ({}); keeping all candidates", e);
            return MonteCarloOutcome {
                selected: scored.iter().map(|(q, _)| q.clone()).collect(),
                weights: scored.iter().cloned().collect(),
                avg_candidate_score,
                avg_selected_score: avg_candidate_score,
            };
        }
    };

    let draws = max_samples.min(scored.len());
    let mut selected: Vec<String> = Vec::new();
    let mut selected_weights: HashMap<String, f32> = HashMap::new();
    for _ in 0..draws {
        let idx = dist.sample(rng);
        let (query, score) = &scored[idx];
        // Sampling is with replacement; a repeated draw expands one branch,
        // not two identical ones.
        if !selected_weights.contains_key(query) {
            selected.push(query.clone());
        }
        selected_weights.insert(query.clone(), *score);
    }

    let avg_selected_score = if selected.is_empty() {
        0.0
    } else {
        selected
            .iter()
            .map(|q| selected_weights.get(q).copied().unwrap_or(0.0))
            .sum::<f32>()
            / selected.len() as f32
    };

    debug!(
        "monte carlo selected {}/{} sub-queries (avg candidate {:.3}, avg selected {:.3})",
        selected.len(),
        scored.len(),
        avg_candidate_score,
        avg_selected_score
    );

    MonteCarloOutcome {
        selected,
        weights: selected_weights,
        avg_candidate_score,
        avg_selected_score,
    }
}
