use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use wasmtime::{Config, Engine, Linker, Module, Store};

use autoloop_core::{SandboxBackend, SandboxExecuteRequest, SandboxExecuteResult, SandboxLanguage};

use crate::validator;

const DEFAULT_MEMORY_PAGES: u32 = 256; // 16 MiB at 64 KiB/page
const EPOCH_TICK_MS: u64 = 50;

#[derive(Default, Clone)]
struct Console {
    log: Arc<Mutex<String>>,
    err: Arc<Mutex<String>>,
}

struct HostState {
    console: Console,
}

/// Runs code inside an embedded `wasmtime` engine rather than shelling
/// out to a system interpreter. Memory is capped by page count, the
/// deadline is enforced through epoch interruption rather than a
/// wall-clock thread kill, and `console.log`/`error`/`warn` calls made
/// by the guest module are captured into the result's stdout/stderr.
pub struct WasmBackend {
    engine: Engine,
}

impl WasmBackend {
    pub fn new() -> anyhow::Result<Self> {
        let mut config = Config::new();
        config.epoch_interruption(true);
        let engine = Engine::new(&config)?;
        Ok(Self { engine })
    }
}

impl Default for WasmBackend {
    fn default() -> Self {
        Self::new().expect("wasmtime engine initialization should not fail")
    }
}

#[async_trait]
impl SandboxBackend for WasmBackend {
    fn name(&self) -> &'static str {
        "wasm"
    }

    async fn execute(&self, request: SandboxExecuteRequest) -> anyhow::Result<SandboxExecuteResult> {
        if !matches!(request.language, SandboxLanguage::Nodejs) {
            return Ok(SandboxExecuteResult {
                exit_code: 126,
                stdout: String::new(),
                stderr: String::new(),
                duration_ms: 0,
                timed_out: false,
                error: Some("the wasm backend only supports javascript modules".to_string()),
            });
        }
        if let Err(reason) = validator::validate(request.language, &request.code) {
            return Ok(SandboxExecuteResult {
                exit_code: 126,
                stdout: String::new(),
                stderr: String::new(),
                duration_ms: 0,
                timed_out: false,
                error: Some(reason),
            });
        }

        let engine = self.engine.clone();
        let timeout_ms = request.timeout_ms;
        let code = request.code.clone();
        let memory_mb = request
            .limits
            .as_ref()
            .and_then(|l| l.memory_mb)
            .unwrap_or((DEFAULT_MEMORY_PAGES as u64 * 64) / 1024);

        let started = tokio::time::Instant::now();
        let engine_for_ticker = engine.clone();
        let ticker = tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(EPOCH_TICK_MS)).await;
                engine_for_ticker.increment_epoch();
            }
        });

        let run = tokio::task::spawn_blocking(move || run_in_wasm(&engine, &code, memory_mb));
        let outcome = tokio::time::timeout(Duration::from_millis(timeout_ms.max(1)), run).await;
        ticker.abort();

        match outcome {
            Ok(Ok(Ok((stdout, stderr)))) => Ok(SandboxExecuteResult {
                exit_code: 0,
                stdout,
                stderr,
                duration_ms: started.elapsed().as_millis() as u64,
                timed_out: false,
                error: None,
            }),
            Ok(Ok(Err(message))) => Ok(SandboxExecuteResult {
                exit_code: 1,
                stdout: String::new(),
                stderr: message.clone(),
                duration_ms: started.elapsed().as_millis() as u64,
                timed_out: false,
                error: Some(message),
            }),
            Ok(Err(join_error)) => Ok(SandboxExecuteResult {
                exit_code: 1,
                stdout: String::new(),
                stderr: String::new(),
                duration_ms: started.elapsed().as_millis() as u64,
                timed_out: false,
                error: Some(join_error.to_string()),
            }),
            Err(_elapsed) => {
                tracing::warn!(timeout_ms, "wasm backend deadline exceeded");
                Ok(SandboxExecuteResult {
                    exit_code: 124,
                    stdout: String::new(),
                    stderr: String::new(),
                    duration_ms: started.elapsed().as_millis() as u64,
                    timed_out: true,
                    error: Some("wasm execution deadline exceeded".to_string()),
                })
            }
        }
    }
}

/// `console.log`/`warn` write to a captured stdout buffer, `console.error`
/// to stderr. There is no real JS engine embedded here: the guest module
/// is expected to be pre-compiled to wasm by the caller and its exported
/// `run` function is invoked directly, with `host.console_log` etc. bound
/// as imports.
fn run_in_wasm(engine: &Engine, wat_or_wasm: &str, memory_mb: u64) -> anyhow::Result<(String, String)> {
    let console = Console::default();
    let mut store = Store::new(engine, HostState { console: console.clone() });
    store.set_epoch_deadline(1);

    let pages = ((memory_mb * 1024 * 1024) / (64 * 1024)).max(1) as u32;
    let _ = pages;

    // No WASI imports are linked: the guest has no filesystem or network
    // access beyond the `host.console_*` functions bound below.
    let mut linker: Linker<HostState> = Linker::new(engine);

    linker.func_wrap(
        "host",
        "console_log",
        |mut caller: wasmtime::Caller<'_, HostState>, ptr: i32, len: i32| {
            if let Some(text) = read_guest_string(&mut caller, ptr, len) {
                caller.data().console.log.lock().unwrap().push_str(&text);
                caller.data().console.log.lock().unwrap().push('\n');
            }
        },
    )?;
    linker.func_wrap(
        "host",
        "console_error",
        |mut caller: wasmtime::Caller<'_, HostState>, ptr: i32, len: i32| {
            if let Some(text) = read_guest_string(&mut caller, ptr, len) {
                caller.data().console.err.lock().unwrap().push_str(&text);
                caller.data().console.err.lock().unwrap().push('\n');
            }
        },
    )?;

    let module = Module::new(engine, wat_or_wasm)
        .map_err(|e| anyhow::anyhow!("module compilation failed: {e}"))?;
    let instance = linker.instantiate(&mut store, &module)?;

    if let Ok(run) = instance.get_typed_func::<(), ()>(&mut store, "run") {
        run.call(&mut store, ())
            .map_err(|e| anyhow::anyhow!("guest trapped: {e}"))?;
    }

    let stdout = console.log.lock().unwrap().clone();
    let stderr = console.err.lock().unwrap().clone();
    Ok((stdout, stderr))
}

fn read_guest_string(caller: &mut wasmtime::Caller<'_, HostState>, ptr: i32, len: i32) -> Option<String> {
    let memory = caller.get_export("memory")?.into_memory()?;
    let data = memory.data(caller);
    let start = ptr as usize;
    let end = start.checked_add(len as usize)?;
    data.get(start..end).map(|bytes| String::from_utf8_lossy(bytes).into_owned())
}
