//! Error handling for the module kernel
//!
//! Configuration errors (bad names, mismatched connectors, unknown ids) are
//! returned synchronously to the caller as [`KernelError`]. Failures inside a
//! running module never travel through this type; they are recorded on the
//! module as a [`crate::module::ModuleFailure`].

use thiserror::Error;

/// Main error type for kernel operations
#[derive(Error, Debug)]
pub enum KernelError {
    /// A prototype with this name is already registered
    #[error("Prototype \"{0}\" is already registered")]
    DuplicatePrototype(String),

    /// No prototype with this name is registered
    #[error("Unknown prototype \"{0}\"")]
    UnknownPrototype(String),

    /// The configured allow-list excludes this prototype
    #[error("Module \"{0}\" is not allowed by the module filter")]
    ModuleNotAllowed(String),

    /// A connector name was used twice within one module
    #[error("Module \"{module}\" already has a connector named \"{connector}\"")]
    DuplicateConnector { module: String, connector: String },

    /// The named connector does not exist on the module
    #[error("Module \"{module}\" has no {direction} connector named \"{connector}\"")]
    UnknownConnector {
        module: String,
        connector: String,
        direction: &'static str,
    },

    /// Output and input carry different type tags
    #[error("Cannot connect {output} ({output_tag}) to {input} ({input_tag}): type mismatch")]
    TypeMismatch {
        output: String,
        output_tag: String,
        input: String,
        input_tag: String,
    },

    /// The input already has a source; it must be disconnected first
    #[error("Input {input} is already connected to {source_name}")]
    InputAlreadyConnected { input: String, source_name: String },

    /// Disconnect was asked for a pair that is not linked
    #[error("{output} is not connected to {input}")]
    NotConnected { output: String, input: String },

    /// The module id does not (or no longer) name a live module
    #[error("Unknown module id {0}")]
    UnknownModule(u32),

    /// A script or external caller passed a value that cannot be a module id
    #[error("Invalid module id {0}")]
    InvalidModuleId(i64),

    /// Every module id has been handed out
    #[error("Module ids exhausted")]
    IdsExhausted,

    /// The module has terminated and cannot take part in the operation
    #[error("Module \"{0}\" is not running")]
    ModuleNotRunning(String),

    /// Operation not legal in the module's current lifecycle state
    #[error("Invalid state for module \"{module}\": {message}")]
    InvalidState { module: String, message: String },

    /// The property does not exist on the module
    #[error("Module \"{module}\" has no property \"{property}\"")]
    UnknownProperty { module: String, property: String },

    /// The value kind does not match the declared property kind
    #[error("Property \"{property}\" expects {expected}, got {actual}")]
    PropertyType {
        property: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// The value violates the property's constraint
    #[error("Property \"{property}\" rejected value: {reason}")]
    PropertyRejected { property: String, reason: String },

    /// A module's processing step failed
    #[error("Processing failed: {0}")]
    Processing(String),

    /// Errors raised while evaluating a script
    #[error("Script error: {0}")]
    Script(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// A project file is malformed or inconsistent
    #[error("Project error: {0}")]
    Project(String),

    /// The kernel thread is gone or a reply channel was dropped
    #[error("Channel error: {0}")]
    Channel(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<KernelError>,
    },
}

impl KernelError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        KernelError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a script error from a Rhai error
    pub fn from_rhai_error(err: Box<rhai::EvalAltResult>) -> Self {
        KernelError::Script(err.to_string())
    }

    /// The innermost error, with any context layers removed.
    pub fn root(&self) -> &KernelError {
        match self {
            KernelError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type alias for kernel operations
pub type Result<T> = std::result::Result<T, KernelError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, Box<rhai::EvalAltResult>> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| KernelError::from_rhai_error(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| KernelError::from_rhai_error(e).with_context(f()))
    }
}
