//! Sample host library, unit sources and logging setup.

use std::sync::Once;

use tessera_registry::{CallArgs, Library, Value};

/// A library with a few small packages:
///
/// - `math.add(a, b)`, `math.mul(a, b)`: integer arithmetic
/// - `text.concat(a, b)`: string concatenation
/// - `pipeline.apply(f, x)`: calls the entry `f` with `x` as its only
///   positional argument
#[must_use]
pub fn test_library() -> Library {
    let mut lib = Library::new();
    lib.register("math.add", |args| {
        Ok(Value::Int(args.int("a")?.saturating_add(args.int("b")?)))
    })
    .register("math.mul", |args| {
        Ok(Value::Int(args.int("a")?.saturating_mul(args.int("b")?)))
    })
    .register("text.concat", |args| {
        Ok(Value::from(format!("{}{}", args.str("a")?, args.str("b")?)))
    })
    .register("pipeline.apply", |args| {
        let f = args.entry("f")?;
        Ok(f.call(CallArgs::new().arg(args.value("x")?.clone()))?)
    });
    lib
}

/// A unit declaring `add(a: int, b: int = 1) -> int`.
pub const ADD_UNIT: &str = r#"
imports = ["math"]

[[entry]]
name = "add"
call = "math.add"
doc = "Add two integers."
returns = "int"
params = [{ name = "a", type = "int" }, { name = "b", type = "int", default = 1 }]
"#;

/// A unit declaring `mul(a: int, b: int) -> int` and a private helper.
pub const MUL_UNIT: &str = r#"
imports = ["math"]

[[entry]]
name = "mul"
call = "math.mul"
doc = "Multiply two integers."
returns = "int"
params = [{ name = "a", type = "int" }, { name = "b", type = "int" }]

[[entry]]
name = "_double"
call = "math.mul"
doc = "Double an integer."
returns = "int"
params = [{ name = "a", type = "int" }, { name = "b", type = "int" }]
bind = { b = 2 }
"#;

/// A unit that imports a package the host does not provide.
pub const MISSING_IMPORT_UNIT: &str = r#"
imports = ["torchvision"]

[[entry]]
name = "resnet"
call = "torchvision.resnet"
doc = "A residual network."
returns = "Model"
"#;

/// A unit that is not valid TOML.
pub const MALFORMED_UNIT: &str = "imports = [\"math\"\n[[entry]\n";

static TRACING: Once = Once::new();

/// Install a `tracing` subscriber honoring `RUST_LOG`, once per process.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
