use std::sync::Arc;

use hbl_core::collections::ConcurrentMap;
use hbl_core::error::{Error, Result};
use hbl_core::ir::Expr;
use hbl_core::parser::{parse, CompileOptions};
use hbl_core::preprocess::preprocess;
use hbl_core::value::Value;
use serde::Serialize;

use crate::builtins;
use crate::compile::{first_async_op, first_unknown_op, BuildCtx};
use crate::ops::{Method, Operation};
use crate::registry::{TemplateBody, TemplateEntry, TemplateRegistry};
use crate::scope::Scope;

/// Operation table plus template registry. Cloning is cheap and clones share
/// both tables.
#[derive(Clone)]
pub struct Engine {
    operations: Arc<ConcurrentMap<String, Arc<dyn Operation>>>,
    templates: TemplateRegistry,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// An engine with the built-in operations, sharing the process-wide
    /// template registry.
    pub fn new() -> Self {
        Self::with_registry(TemplateRegistry::global())
    }

    /// An engine with a private template registry.
    pub fn isolated() -> Self {
        Self::with_registry(TemplateRegistry::new())
    }

    pub fn with_registry(templates: TemplateRegistry) -> Self {
        let engine = Self {
            operations: Arc::new(ConcurrentMap::new()),
            templates,
        };
        builtins::install(&engine);
        engine
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.templates
    }

    pub fn add_operation(&self, name: impl Into<String>, op: impl Operation + 'static) {
        self.operations.insert(name.into(), Arc::new(op));
    }

    /// Registers `method` under its own name, replacing any operation of that
    /// name.
    pub fn add_method(&self, method: Method) {
        let name = method.name.clone();
        self.operations.insert(name, Arc::new(method));
    }

    /// Makes `alias` resolve to the operation registered as `name`.
    pub fn alias(&self, alias: &str, name: &str) -> Result<()> {
        let op = self.operation(name)?;
        self.operations.insert(alias.to_string(), op);
        Ok(())
    }

    pub fn operation(&self, name: &str) -> Result<Arc<dyn Operation>> {
        self.operations
            .get_cloned(name)
            .ok_or_else(|| Error::UnknownOperation(name.to_string()))
    }

    pub fn has_operation(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    /// Preprocess and parse.
    pub fn compile_to_ir(&self, text: &str, options: &CompileOptions) -> Result<Expr> {
        let text = preprocess(text);
        parse(&text, options, &|name| self.has_operation(name))
    }

    pub fn build_interpreted(&self, ir: Expr) -> Result<Template> {
        if let Some(name) = first_async_op(self, &ir) {
            self.operation(&name)?;
            return Err(Error::AsyncOperation(name));
        }
        Ok(Template {
            engine: self.clone(),
            body: TemplateBody::interpreted(Arc::new(ir), self),
        })
    }

    pub fn build_interpreted_async(&self, ir: Expr) -> Result<AsyncTemplate> {
        if let Some(name) = first_unknown_op(self, &ir) {
            return Err(Error::UnknownOperation(name));
        }
        Ok(AsyncTemplate {
            engine: self.clone(),
            body: TemplateBody::interpreted(Arc::new(ir), self),
        })
    }

    pub fn build_compiled(&self, ir: &Expr) -> Result<Template> {
        let fragment = BuildCtx::new(self).synthesize(ir)?;
        if !fragment.supports_sync() {
            let name = fragment.async_op().unwrap_or("template").to_string();
            return Err(Error::AsyncOperation(name));
        }
        Ok(Template {
            engine: self.clone(),
            body: TemplateBody::Compiled(fragment),
        })
    }

    pub fn build_compiled_async(&self, ir: &Expr) -> Result<AsyncTemplate> {
        let fragment = BuildCtx::new(self).synthesize(ir)?;
        Ok(AsyncTemplate {
            engine: self.clone(),
            body: TemplateBody::Compiled(fragment),
        })
    }

    pub fn compile(&self, text: &str, options: &CompileOptions) -> Result<Template> {
        self.build_compiled(&self.compile_to_ir(text, options)?)
    }

    pub fn compile_async(&self, text: &str, options: &CompileOptions) -> Result<AsyncTemplate> {
        self.build_compiled_async(&self.compile_to_ir(text, options)?)
    }

    pub fn interpreted(&self, text: &str, options: &CompileOptions) -> Result<Template> {
        self.build_interpreted(self.compile_to_ir(text, options)?)
    }

    pub fn interpreted_async(&self, text: &str, options: &CompileOptions) -> Result<AsyncTemplate> {
        self.build_interpreted_async(self.compile_to_ir(text, options)?)
    }

    /// Parses and compiles `text` once and stores it under `name`.
    pub fn register_partial(&self, name: &str, text: &str, options: &CompileOptions) -> Result<()> {
        let ir = self.compile_to_ir(text, options)?;
        let entry = TemplateEntry::compiled(name, &ir, self)?;
        self.templates.insert(entry);
        Ok(())
    }

    pub fn register_partial_interpreted(
        &self,
        name: &str,
        text: &str,
        options: &CompileOptions,
    ) -> Result<()> {
        let ir = self.compile_to_ir(text, options)?;
        self.templates
            .insert(TemplateEntry::interpreted(name, ir, self));
        Ok(())
    }
}

fn to_value<T: Serialize>(data: &T) -> Result<Value> {
    Ok(Value::from(serde_json::to_value(data)?))
}

/// A template with a synchronous evaluator.
#[derive(Clone)]
pub struct Template {
    engine: Engine,
    body: TemplateBody,
}

impl Template {
    pub fn render(&self, data: &Value) -> Result<String> {
        let scope = Scope::root(&self.engine, data);
        Ok(self.body.call(&scope)?.to_output())
    }

    pub fn render_data<T: Serialize>(&self, data: &T) -> Result<String> {
        self.render(&to_value(data)?)
    }
}

/// A template whose evaluation is awaited.
#[derive(Clone)]
pub struct AsyncTemplate {
    engine: Engine,
    body: TemplateBody,
}

impl AsyncTemplate {
    pub async fn render(&self, data: &Value) -> Result<String> {
        let scope = Scope::root(&self.engine, data);
        Ok(self.body.call_async(&scope).await?.to_output())
    }

    pub async fn render_data<T: Serialize>(&self, data: &T) -> Result<String> {
        self.render(&to_value(data)?).await
    }
}
