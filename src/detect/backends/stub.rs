use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::ModelConfig;
use crate::detect::backend::{InferenceBackend, QuantizedTensor};
use crate::detect::decoder::{SyntheticBox, TensorEncoder};
use crate::frame::RawFrame;

/// Scripted backend for tests and synthetic runs.
///
/// Cycles through a list of scenes, encoding each one into an output tensor of the
/// model's layout. Ignores the frame content.
pub struct StubBackend {
    encoder: TensorEncoder,
    scenes: Vec<Vec<SyntheticBox>>,
    cursor: usize,
    dropout: Option<(f32, StdRng)>,
    pending_failures: u32,
}

impl StubBackend {
    /// A backend that always returns an empty tensor of the model's layout.
    pub fn new(model: &ModelConfig) -> Self {
        Self {
            encoder: TensorEncoder::new(model),
            scenes: Vec::new(),
            cursor: 0,
            dropout: None,
            pending_failures: 0,
        }
    }

    pub fn with_scenes(mut self, scenes: Vec<Vec<SyntheticBox>>) -> Self {
        self.scenes = scenes;
        self.cursor = 0;
        self
    }

    /// Drop each scripted box with `probability`, emulating per-frame flicker.
    pub fn with_dropout(mut self, probability: f32, seed: u64) -> Self {
        self.dropout = Some((probability.clamp(0.0, 1.0), StdRng::seed_from_u64(seed)));
        self
    }

    /// Make the next `count` calls to `infer` fail.
    pub fn fail_next(&mut self, count: u32) {
        self.pending_failures = count;
    }

    /// A subject walking left to right across the frame, wearing the first accessory
    /// class for the first half of the walk, followed by an empty scene.
    pub fn walkthrough(model: &ModelConfig) -> Self {
        const WALK_FRAMES: usize = 60;
        const EMPTY_FRAMES: usize = 40;

        let mut scenes = Vec::with_capacity(WALK_FRAMES + EMPTY_FRAMES);
        for step in 0..WALK_FRAMES {
            let cx = 0.15 + 0.7 * step as f32 / WALK_FRAMES as f32;
            let mut scene = vec![SyntheticBox {
                class_id: 0,
                cx,
                cy: 0.55,
                w: 0.18,
                h: 0.5,
                objectness: 0.9,
                score: 0.9,
            }];
            if model.classes > 1 && step < WALK_FRAMES / 2 {
                scene.push(SyntheticBox {
                    class_id: 1,
                    cx,
                    cy: 0.22,
                    w: 0.08,
                    h: 0.08,
                    objectness: 0.8,
                    score: 0.85,
                });
            }
            scenes.push(scene);
        }
        scenes.extend(std::iter::repeat(Vec::new()).take(EMPTY_FRAMES));
        Self::new(model).with_scenes(scenes)
    }

    fn next_scene(&mut self) -> Vec<SyntheticBox> {
        if self.scenes.is_empty() {
            return Vec::new();
        }
        let scene = self.scenes[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.scenes.len();
        match self.dropout.as_mut() {
            Some((probability, rng)) => scene
                .into_iter()
                .filter(|_| rng.gen::<f32>() >= *probability)
                .collect(),
            None => scene,
        }
    }
}

impl InferenceBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn infer(&mut self, _frame: &RawFrame) -> Result<QuantizedTensor> {
        if self.pending_failures > 0 {
            self.pending_failures -= 1;
            return Err(anyhow!("stub inference job failed"));
        }
        let scene = self.next_scene();
        Ok(QuantizedTensor::new(self.encoder.encode(&scene)))
    }
}
