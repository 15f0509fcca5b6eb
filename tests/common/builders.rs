//! Test module builders
//!
//! [`RecordingModule`] reports every hook invocation over a channel so tests
//! can assert what a module thread saw and in which order.

use super::{value_of, NUMBER};
use crossbeam_channel::Sender;
use std::time::{Duration, Instant};
use vizkernel::error::{KernelError, Result};
use vizkernel::graph::{ConnectorSpec, TypeTag, Update};
use vizkernel::module::PropertySpec;
use vizkernel::{
    AnyModule, ModuleContext, ModuleInfo, ModuleInstance, ModulePlugin, ModulePrototype,
    PropertyValue,
};

/// Value that makes a recording module return an error
pub const FAIL_VALUE: i64 = -1;

/// Value that makes a recording module panic
pub const PANIC_VALUE: i64 = 99;

#[derive(Debug, Clone)]
pub enum Record {
    Activated,
    Data(Vec<Update>),
    Property(String, PropertyValue),
    Custom(String),
    Deactivated,
}

impl Record {
    /// Integer values of a data record, in delivery order
    pub fn values(&self) -> Vec<Option<i64>> {
        match self {
            Record::Data(updates) => updates.iter().map(value_of).collect(),
            _ => Vec::new(),
        }
    }
}

pub struct RecordingModule {
    tx: Sender<Record>,
    hold_until_shutdown: bool,
}

impl RecordingModule {
    pub fn new(tx: Sender<Record>) -> Self {
        Self {
            tx,
            hold_until_shutdown: false,
        }
    }

    fn record(&self, record: Record) {
        let _ = self.tx.send(record);
    }
}

impl ModulePlugin for RecordingModule {
    fn on_activate(&mut self, _ctx: &mut ModuleContext<'_>) -> Result<()> {
        self.record(Record::Activated);
        Ok(())
    }

    fn on_data(&mut self, ctx: &mut ModuleContext<'_>, updates: &[Update]) -> Result<()> {
        self.record(Record::Data(updates.to_vec()));

        for value in updates.iter().filter_map(value_of) {
            if value == FAIL_VALUE {
                return Err(KernelError::Processing(format!("rejected value {}", value)));
            }
            if value == PANIC_VALUE {
                panic!("cannot handle {}", value);
            }
        }

        if self.hold_until_shutdown {
            let deadline = Instant::now() + Duration::from_secs(5);
            while !ctx.shutdown_requested() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        Ok(())
    }

    fn on_property_change(
        &mut self,
        name: &str,
        value: &PropertyValue,
        _ctx: &mut ModuleContext<'_>,
    ) -> Result<()> {
        self.record(Record::Property(name.to_string(), value.clone()));
        Ok(())
    }

    fn on_custom(&mut self, name: &str, _ctx: &mut ModuleContext<'_>) -> Result<()> {
        self.record(Record::Custom(name.to_string()));
        Ok(())
    }

    fn on_deactivate(&mut self, _ctx: &mut ModuleContext<'_>) -> Result<()> {
        self.record(Record::Deactivated);
        Ok(())
    }
}

/// Builder for recording test modules
pub struct RecordingBuilder {
    name: String,
    inputs: Vec<ConnectorSpec>,
    outputs: Vec<ConnectorSpec>,
    properties: Vec<PropertySpec>,
    custom: Vec<String>,
    hold_until_shutdown: bool,
}

impl RecordingBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            properties: Vec::new(),
            custom: Vec::new(),
            hold_until_shutdown: false,
        }
    }

    pub fn input(self, name: &str) -> Self {
        self.input_tagged(name, NUMBER)
    }

    pub fn input_tagged(mut self, name: &str, tag: TypeTag) -> Self {
        self.inputs.push(ConnectorSpec::input(name, tag));
        self
    }

    pub fn output(mut self, name: &str) -> Self {
        self.outputs.push(ConnectorSpec::output(name, NUMBER));
        self
    }

    pub fn property(mut self, name: &str, default: impl Into<PropertyValue>) -> Self {
        self.properties.push(PropertySpec::new(name, default));
        self
    }

    pub fn custom(mut self, name: &str) -> Self {
        self.custom.push(name.to_string());
        self
    }

    /// Keep the first `on_data` call running until shutdown is requested
    pub fn hold_until_shutdown(mut self) -> Self {
        self.hold_until_shutdown = true;
        self
    }

    pub fn build(self, tx: Sender<Record>) -> ModuleInstance {
        let plugin = RecordingModule {
            tx,
            hold_until_shutdown: self.hold_until_shutdown,
        };
        let mut instance = ModuleInstance::new(ModuleInfo::new(self.name), AnyModule::plugin(plugin));
        for spec in self.inputs {
            instance.register_input(spec).unwrap();
        }
        for spec in self.outputs {
            instance.register_output(spec).unwrap();
        }
        for spec in self.properties {
            instance.declare_property(spec).unwrap();
        }
        for name in self.custom {
            instance.add_custom_condition(name).unwrap();
        }
        instance
    }

    pub fn prototype(self, tx: Sender<Record>) -> ModulePrototype {
        let mut builder = ModulePrototype::builder(self.name);
        for spec in self.inputs {
            builder = builder.input(spec);
        }
        for spec in self.outputs {
            builder = builder.output(spec);
        }
        for spec in self.properties {
            builder = builder.property(spec);
        }
        for name in self.custom {
            builder = builder.custom_condition(name);
        }
        builder
            .build(move || AnyModule::plugin(RecordingModule::new(tx.clone())))
            .unwrap()
    }
}

/// A module with one `in` input and one `out` output
pub fn relay(name: &str, tx: Sender<Record>) -> ModuleInstance {
    RecordingBuilder::new(name).input("in").output("out").build(tx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_builder() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let instance = RecordingBuilder::new("recorder")
            .input("a")
            .output("b")
            .property("gain", 1.0)
            .build(tx);
        let handle = instance.handle();

        assert_eq!(handle.name(), "recorder");
        assert!(handle.input("a").is_some());
        assert!(handle.output("b").is_some());
        assert_eq!(handle.property("gain"), Some(PropertyValue::Float(1.0)));
    }
}
