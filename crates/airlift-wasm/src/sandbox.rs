//! Sandboxed execution of flight modules
//!
//! The sandbox grants exactly what the flight contract names: argv with the
//! release name first, the caller's env entries, optional stdin, wall and
//! monotonic clocks, nanosleep, and a cryptographically strong random
//! source. No filesystem preopens, no network, no other host calls.
//!
//! Epoch interruption keeps the execution future yielding at every tick, so
//! an external cancellation terminates the module promptly instead of
//! waiting for it to finish.

use once_cell::sync::Lazy;
use tokio_util::sync::CancellationToken;
use wasmtime::{Config, Engine, Linker, Module, Store};
use wasmtime_wasi::WasiCtxBuilder;
use wasmtime_wasi::pipe::{MemoryInputPipe, MemoryOutputPipe};
use wasmtime_wasi::preview1::{self, WasiP1Ctx};

use crate::error::{Result, WasmError};

/// Upper bound on captured stdout/stderr. A manifest larger than this is a
/// flight bug, not a real release.
const MAX_CAPTURED_OUTPUT: usize = 64 * 1024 * 1024;

/// Interval at which running modules yield to the host.
const EPOCH_TICK: std::time::Duration = std::time::Duration::from_millis(10);

static ENGINE: Lazy<Engine> = Lazy::new(|| {
    let mut config = Config::new();
    config.async_support(true);
    config.epoch_interruption(true);

    let engine = Engine::new(&config).expect("engine configuration is valid");

    let ticker = engine.clone();
    std::thread::Builder::new()
        .name("airlift-epoch".to_string())
        .spawn(move || {
            loop {
                std::thread::sleep(EPOCH_TICK);
                ticker.increment_epoch();
            }
        })
        .expect("failed to spawn epoch ticker");

    engine
});

/// Inputs for one flight execution.
#[derive(Debug, Default)]
pub struct ExecuteParams<'a> {
    /// Raw wasm module bytes.
    pub wasm: &'a [u8],

    /// Release name; becomes `argv[0]` inside the sandbox.
    pub release: &'a str,

    /// Additional arguments, `argv[1..]`.
    pub args: &'a [String],

    /// Exactly the environment the module will see.
    pub env: &'a [(String, String)],

    /// Bytes fed to the module's stdin; stdin reads EOF when `None`.
    pub stdin: Option<Vec<u8>>,
}

/// Run a flight to completion and return its stdout bytes.
///
/// Fails on compile errors, traps, non-zero exit, cancellation, and empty
/// stdout. Every failure carries whatever the module wrote to stderr.
pub async fn execute(params: ExecuteParams<'_>, cancel: &CancellationToken) -> Result<Vec<u8>> {
    let module = Module::new(&ENGINE, params.wasm)
        .map_err(|err| WasmError::Compile(format!("{err:#}")))?;

    let stdout = MemoryOutputPipe::new(MAX_CAPTURED_OUTPUT);
    let stderr = MemoryOutputPipe::new(MAX_CAPTURED_OUTPUT);

    let mut builder = WasiCtxBuilder::new();
    builder
        .arg(params.release)
        .stdout(stdout.clone())
        .stderr(stderr.clone());
    for arg in params.args {
        builder.arg(arg);
    }
    for (key, value) in params.env {
        builder.env(key, value);
    }
    if let Some(input) = params.stdin {
        builder.stdin(MemoryInputPipe::new(input));
    }

    let mut store = Store::new(&ENGINE, builder.build_p1());
    store.set_epoch_deadline(1);
    store.epoch_deadline_async_yield_and_update(1);

    let mut linker: Linker<WasiP1Ctx> = Linker::new(&ENGINE);
    preview1::add_to_linker_async(&mut linker, |ctx| ctx).map_err(|err| WasmError::Runtime {
        message: format!("{err:#}"),
        stderr: String::new(),
    })?;

    let run = async {
        let instance = linker.instantiate_async(&mut store, &module).await?;
        let start = instance.get_typed_func::<(), ()>(&mut store, "_start")?;
        start.call_async(&mut store, ()).await
    };

    let outcome = tokio::select! {
        outcome = run => outcome,
        _ = cancel.cancelled() => {
            return Err(WasmError::Cancelled {
                stderr: captured(&stderr),
            });
        }
    };

    if let Err(error) = outcome {
        // proc_exit surfaces as an I32Exit error; zero is a normal exit.
        match error.downcast_ref::<wasmtime_wasi::I32Exit>() {
            Some(exit) if exit.0 == 0 => {}
            Some(exit) => {
                return Err(WasmError::Exit {
                    code: exit.0,
                    stderr: captured(&stderr),
                });
            }
            None => {
                return Err(WasmError::Runtime {
                    message: format!("{error:#}"),
                    stderr: captured(&stderr),
                });
            }
        }
    }

    drop(store);

    let output = stdout.contents().to_vec();
    if output.is_empty() {
        return Err(WasmError::EmptyOutput {
            stderr: captured(&stderr),
        });
    }

    Ok(output)
}

fn captured(pipe: &MemoryOutputPipe) -> String {
    let contents = pipe.contents();
    if contents.is_empty() {
        return "(no output captured on stderr)".to_string();
    }
    String::from_utf8_lossy(&contents).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Writes "hello" to the given fd and exits cleanly.
    fn write_module(fd: u32) -> String {
        format!(
            r#"(module
                (import "wasi_snapshot_preview1" "fd_write"
                    (func $fd_write (param i32 i32 i32 i32) (result i32)))
                (memory (export "memory") 1)
                (data (i32.const 8) "hello")
                (func (export "_start")
                    (i32.store (i32.const 0) (i32.const 8))
                    (i32.store (i32.const 4) (i32.const 5))
                    (drop (call $fd_write (i32.const {fd}) (i32.const 0) (i32.const 1) (i32.const 20)))))"#
        )
    }

    const TRAP_MODULE: &str = r#"(module
        (memory (export "memory") 1)
        (func (export "_start") unreachable))"#;

    const SPIN_MODULE: &str = r#"(module
        (memory (export "memory") 1)
        (func (export "_start") (loop (br 0))))"#;

    fn params<'a>(wasm: &'a [u8], release: &'a str) -> ExecuteParams<'a> {
        ExecuteParams {
            wasm,
            release,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_stdout_is_captured() {
        let wasm = write_module(1);
        let output = execute(params(wasm.as_bytes(), "foo"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(output, b"hello");
    }

    #[tokio::test]
    async fn test_empty_stdout_is_a_failure() {
        let wasm = write_module(2); // writes to stderr only
        let err = execute(params(wasm.as_bytes(), "foo"), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            WasmError::EmptyOutput { stderr } => assert_eq!(stderr, "hello"),
            other => panic!("expected EmptyOutput, got: {other}"),
        }
    }

    #[tokio::test]
    async fn test_trap_surfaces_stderr_placeholder() {
        let err = execute(
            params(TRAP_MODULE.as_bytes(), "foo"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        match err {
            WasmError::Runtime { stderr, .. } => {
                assert_eq!(stderr, "(no output captured on stderr)");
            }
            other => panic!("expected Runtime, got: {other}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_bytes_fail_to_compile() {
        let err = execute(params(b"not wasm", "foo"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WasmError::Compile(_)));
    }

    #[tokio::test]
    async fn test_cancellation_terminates_a_spinning_module() {
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let err = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            execute(params(SPIN_MODULE.as_bytes(), "foo"), &cancel),
        )
        .await
        .expect("cancellation must terminate the module promptly")
        .unwrap_err();

        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_nonzero_exit_code() {
        let wasm = r#"(module
            (import "wasi_snapshot_preview1" "proc_exit" (func $proc_exit (param i32)))
            (memory (export "memory") 1)
            (func (export "_start") (call $proc_exit (i32.const 3))))"#;
        let err = execute(params(wasm.as_bytes(), "foo"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WasmError::Exit { code: 3, .. }));
    }
}
