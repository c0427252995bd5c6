//! Sandbox Runner: process, container, and wasm code execution backends
//! behind the shared `SandboxBackend` contract, plus the `auto` backend
//! selection heuristic and the reflection-driven retry loop.

mod process_backend;
mod reflection;
mod selection;
mod validator;

#[cfg(feature = "container")]
mod container_backend;
#[cfg(feature = "wasm")]
mod wasm_backend;

pub use process_backend::ProcessBackend;
pub use reflection::{classify_outcome, execute_with_reflection, OutcomeKind, ReflectionAttempt, ReflectionOutcome};
pub use selection::{select_backend, BackendChoice};

#[cfg(feature = "container")]
pub use container_backend::ContainerBackend;
#[cfg(feature = "wasm")]
pub use wasm_backend::WasmBackend;

use autoloop_core::{SandboxBackend, SandboxExecuteRequest, SandboxExecuteResult};

/// Wires the available backends behind the `auto` heuristic. Built
/// without the `container`/`wasm` features, this degrades to the
/// always-available process backend.
pub struct SandboxRunner {
    process: ProcessBackend,
    #[cfg(feature = "container")]
    container: Option<ContainerBackend>,
    #[cfg(feature = "wasm")]
    wasm: Option<WasmBackend>,
}

impl SandboxRunner {
    pub fn new() -> Self {
        Self {
            process: ProcessBackend,
            #[cfg(feature = "container")]
            container: ContainerBackend::connect().ok(),
            #[cfg(feature = "wasm")]
            wasm: WasmBackend::new().ok(),
        }
    }

    fn container_available(&self) -> bool {
        #[cfg(feature = "container")]
        {
            self.container.is_some()
        }
        #[cfg(not(feature = "container"))]
        {
            false
        }
    }

    /// Picks a backend via [`select_backend`] and runs the request
    /// against it, falling back to the process backend when the chosen
    /// backend isn't compiled in or failed to initialize.
    pub async fn execute(&self, request: SandboxExecuteRequest) -> anyhow::Result<SandboxExecuteResult> {
        let choice = select_backend(request.language, &request.code, self.container_available());
        match choice {
            BackendChoice::Wasm => {
                #[cfg(feature = "wasm")]
                if let Some(backend) = &self.wasm {
                    return backend.execute(request).await;
                }
                self.process.execute(request).await
            }
            BackendChoice::Container => {
                #[cfg(feature = "container")]
                if let Some(backend) = &self.container {
                    return backend.execute(request).await;
                }
                self.process.execute(request).await
            }
            BackendChoice::Process => self.process.execute(request).await,
        }
    }
}

impl Default for SandboxRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoloop_core::SandboxLanguage;

    #[tokio::test]
    async fn runner_executes_benign_python_through_process_fallback() {
        let runner = SandboxRunner {
            process: ProcessBackend,
            #[cfg(feature = "container")]
            container: None,
            #[cfg(feature = "wasm")]
            wasm: None,
        };
        let result = runner
            .execute(SandboxExecuteRequest {
                language: SandboxLanguage::Python,
                code: "print('hi')".to_string(),
                timeout_ms: 2000,
                working_dir: None,
                env: Default::default(),
                limits: None,
            })
            .await
            .unwrap();
        assert!(!result.timed_out);
    }
}
