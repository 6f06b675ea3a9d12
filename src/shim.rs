// src/shim.rs

//! Node.js shim that runs inside the sandbox child.
//!
//! Responsibilities of the shim:
//! - Compile the submission inside a fresh `vm` context
//! - Report whether a function named `solution` exists
//! - Call it once per probe with a per-call timeout
//! - Emit ONE JSON object to STDOUT and exit
//!
//! Probe arguments cross into the context as a JSON string and are parsed
//! there, so the submission never holds host-realm objects.

pub const SHIM_FILE: &str = "grader_sandbox.mjs";

/// Usage (internal):
/// node grader_sandbox.mjs <input.json>
///
/// input.json: { source, probes: [[arg, ...], ...], call_timeout_ms }
pub fn node_shim() -> &'static str {
    r#"
import fs from "node:fs";
import vm from "node:vm";

const [, , inputPath] = process.argv;

function emit(payload) {
  process.stdout.write(JSON.stringify(payload));
}

function fatal(message) {
  emit({ ok: false, error: message });
  process.exit(1);
}

function describe(err) {
  try {
    if (err !== null && typeof err === "object" && "message" in err) {
      return String(err.message);
    }
    return String(err);
  } catch (_) {
    return "Unknown error";
  }
}

function encode(value) {
  const type = typeof value;
  if (type === "number") {
    return { threw: false, type, value: Number.isFinite(value) ? value : String(value) };
  }
  if (type === "string" || type === "boolean") {
    return { threw: false, type, value };
  }
  return { threw: false, type: value === null ? "null" : type, value: null };
}

if (!inputPath) {
  fatal("Usage: node grader_sandbox.mjs <input.json>");
}

let input;
try {
  input = JSON.parse(fs.readFileSync(inputPath, "utf8"));
} catch (e) {
  fatal("Failed to read sandbox input: " + describe(e));
}

const timeout = input.call_timeout_ms;
const context = vm.createContext(Object.create(null), {
  name: "submission",
  codeGeneration: { strings: false, wasm: false },
  microtaskMode: "afterEvaluate",
});

// Browser-ish globals a submission may touch at load time, defined from
// inside the context.
vm.runInContext(
  "globalThis.console = { log() {}, info() {}, warn() {}, error() {}, debug() {} };" +
    "globalThis.alert = function () {};" +
    "globalThis.prompt = function () { return null; };" +
    "globalThis.confirm = function () { return false; };",
  context
);

let solution = false;
let loadError = null;
try {
  new vm.Script(String(input.source), { filename: "submission.js" }).runInContext(context, { timeout });
  solution = vm.runInContext("typeof solution === 'function'", context) === true;
} catch (e) {
  loadError = describe(e);
}

const calls = [];
if (solution) {
  const invoke = new vm.Script("solution(...JSON.parse(__graderArgs))", { filename: "probe.js" });
  for (const args of input.probes) {
    context.__graderArgs = JSON.stringify(args);
    try {
      calls.push(encode(invoke.runInContext(context, { timeout })));
    } catch (e) {
      calls.push({ threw: true, error: describe(e) });
    }
  }
}

emit({ ok: true, solution, load_error: loadError, calls });
process.exit(0);
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shim_never_exposes_host_modules_to_the_submission() {
        let shim = node_shim();
        assert!(shim.contains("vm.createContext(Object.create(null)"));
        assert!(shim.contains("strings: false"));
        assert!(!shim.contains("require("));
    }
}
