//! Canned script used by mock runs.

use async_trait::async_trait;
use reel_core::script::{Scene, Script, ScriptRequest};

use crate::{ProviderError, ScriptProvider};

const MOCK_TITLE: &str = "Three mistakes people make when changing jobs in their 30s";

const MOCK_SCENES: [(&str, &str); 5] = [
    (
        "Changing jobs in your 30s? Do this and it will go wrong.",
        "Japanese man in his 30s looking worried at office desk, realistic photo, vertical 9:16, soft lighting",
    ),
    (
        "Number one: picking the new job on salary alone.",
        "Close up of Japanese salary statement on desk with calculator, realistic photo, vertical 9:16",
    ),
    (
        "Number two: applying without knowing what you actually want.",
        "Japanese businessman staring at blank resume paper looking confused, realistic photo, vertical 9:16",
    ),
    (
        "Number three: quitting before you start looking.",
        "Japanese man carrying cardboard box leaving office building, realistic photo, vertical 9:16, dramatic lighting",
    ),
    (
        "Prepare while you are still employed, and change jobs without regrets.",
        "Confident Japanese businessman smiling at new modern office, realistic photo, vertical 9:16, bright natural light",
    ),
];

const MOCK_SCENE_SECS: f64 = 5.0;

/// Five 5-second scenes, independent of the requested theme.
pub fn mock_script() -> Script {
    Script {
        title: MOCK_TITLE.to_string(),
        scenes: MOCK_SCENES
            .iter()
            .zip(1..)
            .map(|(&(text, image_prompt), scene_id)| Scene {
                scene_id,
                text: text.to_string(),
                image_prompt: image_prompt.to_string(),
                duration_sec: MOCK_SCENE_SECS,
                emotion: None,
            })
            .collect(),
    }
}

/// Script provider that always returns [`mock_script`].
#[derive(Debug, Default, Clone, Copy)]
pub struct MockScriptProvider;

#[async_trait]
impl ScriptProvider for MockScriptProvider {
    async fn generate_script(&self, _request: &ScriptRequest) -> Result<Script, ProviderError> {
        Ok(mock_script())
    }
}
