use autoloop_core::SandboxLanguage;

/// Which concrete backend the `auto` selection should pick for a given
/// snippet. The wasm backend (`wasm_backend.rs`) loads a module directly
/// via `wasmtime::Module::new`, which accepts either the binary `.wasm`
/// format or its WAT text form — not JavaScript source — so eligibility
/// here is a content sniff for one of those two shapes, not a source-level
/// feature scan. Anything else falls back to the container backend when
/// available, and finally the bare process backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendChoice {
    Wasm,
    Container,
    Process,
}

/// The four bytes every binary `.wasm` module starts with (`\0asm`).
const WASM_BINARY_MAGIC: &[u8] = b"\0asm";

fn is_precompiled_wasm(code: &str) -> bool {
    let trimmed = code.trim_start();
    trimmed.as_bytes().starts_with(WASM_BINARY_MAGIC) || trimmed.starts_with("(module")
}

fn wasm_eligible(language: SandboxLanguage, code: &str) -> bool {
    language == SandboxLanguage::Nodejs && is_precompiled_wasm(code)
}

/// Mirrors the `auto` mode described for the Sandbox Runner: prefer the
/// narrowest, cheapest sandbox that can still run the snippet.
pub fn select_backend(language: SandboxLanguage, code: &str, container_available: bool) -> BackendChoice {
    if wasm_eligible(language, code) {
        BackendChoice::Wasm
    } else if container_available {
        BackendChoice::Container
    } else {
        BackendChoice::Process
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precompiled_wat_module_prefers_wasm() {
        let choice = select_backend(SandboxLanguage::Nodejs, "(module (func $run (export \"run\")))", true);
        assert_eq!(choice, BackendChoice::Wasm);
    }

    #[test]
    fn binary_wasm_magic_prefers_wasm() {
        let code = String::from_utf8_lossy(WASM_BINARY_MAGIC).into_owned();
        let choice = select_backend(SandboxLanguage::Nodejs, &code, true);
        assert_eq!(choice, BackendChoice::Wasm);
    }

    #[test]
    fn js_source_falls_back_to_container() {
        let choice = select_backend(SandboxLanguage::Nodejs, "console.log(1 + 1)", true);
        assert_eq!(choice, BackendChoice::Container);
    }

    #[test]
    fn python_never_selects_wasm() {
        let choice = select_backend(SandboxLanguage::Python, "(module)", true);
        assert_eq!(choice, BackendChoice::Container);
    }

    #[test]
    fn falls_back_to_process_without_a_container_runtime() {
        let choice = select_backend(SandboxLanguage::Python, "print(1)", false);
        assert_eq!(choice, BackendChoice::Process);
    }
}
