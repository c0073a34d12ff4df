use std::path::Path;

use async_trait::async_trait;
use reel_core::script::{Scene, Script, ScriptRequest};

use crate::{
    ImageProvider, OperationId, OperationStatus, ProviderError, ScriptProvider, VideoProvider,
    VideoRequest, VoiceProvider, VoiceRequest,
};

/// Stand-in for every provider slot when no client is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredProvider;

fn not_configured(kind: &str) -> ProviderError {
    ProviderError::Fatal(format!(
        "no {kind} provider is configured; start the run in mock mode"
    ))
}

#[async_trait]
impl ScriptProvider for UnconfiguredProvider {
    async fn generate_script(&self, _request: &ScriptRequest) -> Result<Script, ProviderError> {
        Err(not_configured("script"))
    }
}

#[async_trait]
impl ImageProvider for UnconfiguredProvider {
    async fn generate_image(
        &self,
        _scene: &Scene,
        _prompt: &str,
        _output: &Path,
    ) -> Result<(), ProviderError> {
        Err(not_configured("image"))
    }
}

#[async_trait]
impl VideoProvider for UnconfiguredProvider {
    async fn start(&self, _request: VideoRequest<'_>) -> Result<OperationId, ProviderError> {
        Err(not_configured("video"))
    }

    async fn poll(&self, _operation: &OperationId) -> Result<OperationStatus, ProviderError> {
        Err(not_configured("video"))
    }

    async fn retrieve(&self, _operation: &OperationId, _output: &Path) -> Result<(), ProviderError> {
        Err(not_configured("video"))
    }
}

#[async_trait]
impl VoiceProvider for UnconfiguredProvider {
    async fn synthesize(&self, _request: VoiceRequest<'_>, _output: &Path) -> Result<(), ProviderError> {
        Err(not_configured("voice"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn every_call_is_fatal() {
        let provider = UnconfiguredProvider;
        let result = provider.generate_script(&ScriptRequest::new("x")).await;
        assert_matches!(result, Err(ProviderError::Fatal(msg)) if msg.contains("script"));

        let op = OperationId("op".into());
        assert_matches!(provider.poll(&op).await, Err(ProviderError::Fatal(_)));
    }
}
