//! Rhai scripting over the kernel
//!
//! A script drives the same operations as any other caller of
//! [`KernelHandle`](crate::kernel::KernelHandle); kernel errors surface as
//! Rhai runtime errors carrying the error text.
//!
//! ## Functions
//!
//! - `prototypes()` - Names of all registered prototypes
//! - `create(name)` - Create a module, returns its id
//! - `remove(id)` - Stop and remove a module
//! - `connect(out_id, output, in_id, input)` - Link an output to an input
//! - `disconnect(out_id, output, in_id, input)` - Remove a link
//! - `apply(on_id, name)` - Create a module and connect it after `on_id`
//! - `set_property(id, name, value)` - Write a bool, int, float or string property
//! - `get_property(id, name)` - Read a property
//! - `modules()` - Array of maps with `id`, `name`, `state` and `error`
//! - `wait_ready(id)` - Block until the module is ready; false if it terminated
//! - `save_project(path)` - Save the live graph as TOML, or JSON for `.json`
//! - `load_project(path)` - Recreate a saved graph, returns the new ids
//!
//! ## Example
//!
//! ```rhai
//! let source = create("Scalar Source");
//! let scale = apply(source, "Scale");
//! set_property(scale, "factor", 2.5);
//! let stats = apply(scale, "Statistics");
//!
//! for m in modules() {
//!     print(`${m.id}: ${m.name} (${m.state})`);
//! }
//! ```

mod engine;

pub use engine::{to_dynamic, ScriptBridge};
