//! Expansion of a job into its full question × model × region matrix.

use beacon_types::{JobSpec, ModelSpec};

/// Question id used when a job carries no explicit questions.
pub const BENCHMARK_QUESTION_ID: &str = "benchmark";

/// One cell of the execution matrix, self-contained enough to run on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUnit {
    pub region: String,
    pub model: ModelSpec,
    pub question_index: usize,
    pub question_id: String,
    pub question: String,
}

pub fn question_id(index: usize) -> String {
    format!("q{}", index)
}

/// Plans every (question, model, region) triple exactly once, region-major.
///
/// A job without questions runs the benchmark input once per model and region.
pub fn plan(job: &JobSpec) -> Vec<PlannedUnit> {
    let models = job.models();
    let questions: Vec<(usize, String, String)> = if job.questions.is_empty() {
        let prompt = job
            .benchmark
            .input
            .data
            .as_ref()
            .and_then(|d| d.get("prompt").and_then(|p| p.as_str()).map(str::to_string))
            .unwrap_or_else(|| job.benchmark.description.clone());
        vec![(0, BENCHMARK_QUESTION_ID.to_string(), prompt)]
    } else {
        job.questions
            .iter()
            .enumerate()
            .map(|(i, q)| (i, question_id(i), q.clone()))
            .collect()
    };

    let mut units = Vec::with_capacity(job.constraints.regions.len() * models.len() * questions.len());
    for region in &job.constraints.regions {
        for model in &models {
            for (index, id, text) in &questions {
                units.push(PlannedUnit {
                    region: region.clone(),
                    model: model.clone(),
                    question_index: *index,
                    question_id: id.clone(),
                    question: text.clone(),
                });
            }
        }
    }
    units
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    fn job(questions: usize, models: usize, regions: usize) -> JobSpec {
        let models: Vec<String> = (0..models).map(|i| format!("model-{}", i)).collect();
        let regions: Vec<String> = (0..regions).map(|i| format!("region-{}", i)).collect();
        let questions: Vec<String> = (0..questions).map(|i| format!("question {}?", i)).collect();
        serde_json::from_value(json!({
            "benchmark": { "name": "matrix", "container": { "image": "img" } },
            "constraints": { "regions": regions },
            "metadata": { "models": models },
            "questions": questions
        }))
        .unwrap()
    }

    #[test]
    fn plan_is_the_full_cartesian_product() {
        for (q, m, r) in [(1, 1, 1), (2, 3, 2), (4, 1, 3), (3, 2, 4)] {
            let units = plan(&job(q, m, r));
            assert_eq!(units.len(), q * m * r);
            let triples: HashSet<_> = units
                .iter()
                .map(|u| (u.question_index, u.model.id.clone(), u.region.clone()))
                .collect();
            assert_eq!(triples.len(), q * m * r, "every triple appears exactly once");
        }
    }

    #[test]
    fn every_question_is_planned_not_just_the_first() {
        let units = plan(&job(3, 1, 2));
        for region in ["region-0", "region-1"] {
            let mut indices: Vec<_> = units
                .iter()
                .filter(|u| u.region == region)
                .map(|u| u.question_index)
                .collect();
            indices.sort();
            assert_eq!(indices, vec![0, 1, 2]);
        }
        assert_eq!(units[1].question, "question 1?");
        assert_eq!(units[1].question_id, "q1");
    }

    #[test]
    fn repeated_model_entries_plan_each_triple_once() {
        let mut j = job(1, 0, 2);
        j.metadata.insert(
            "models".into(),
            json!(["llama3.2-1b", { "id": "llama3.2-1b", "name": "Llama" }]),
        );
        j.validate().unwrap();
        let units = plan(&j);
        let triples: HashSet<_> = units
            .iter()
            .map(|u| (u.question_index, u.model.id.clone(), u.region.clone()))
            .collect();
        assert_eq!(units.len(), 2);
        assert_eq!(triples.len(), units.len());
    }

    #[test]
    fn job_without_questions_uses_benchmark_prompt() {
        let mut j = job(0, 2, 2);
        j.benchmark.input.data = Some(json!({ "prompt": "Who are you?" }));
        let units = plan(&j);
        assert_eq!(units.len(), 4);
        assert!(units.iter().all(|u| u.question == "Who are you?"));
        assert!(units.iter().all(|u| u.question_id == BENCHMARK_QUESTION_ID));
    }
}
