//! Contracts: turning interface descriptions into method metadata.
//!
//! A contract walks an [`InterfaceDef`] once, while a client is built, and produces one
//! [`MethodMetadata`] per method. [`DeclarativeContract`] holds the shared parsing rules
//! and a registry of annotation handlers; a vocabulary is just a set of registrations.
//! Two vocabularies ship with the crate: [`default_contract`] and [`jaxrs::contract`].
//!
//! # Examples
//!
//! Registering a custom annotation:
//!
//! ```
//! use tether::contract::{default_contract, Contract};
//! use tether::{InterfaceDef, MethodDef};
//! use http::Method;
//!
//! #[derive(Debug)]
//! struct Ping;
//!
//! let contract = default_contract().register_method_annotation(|_: &Ping, data| {
//!     data.set_http_method(Method::GET)?;
//!     data.template_mut().uri("/ping");
//!     Ok(())
//! });
//!
//! let api = InterfaceDef::new("Health").method(MethodDef::new("ping").with(Ping));
//! let methods = contract.parse_and_validate(&api)?;
//! assert_eq!(methods[0].template().path(), "/ping");
//! # Ok::<(), tether::Error>(())
//! ```

mod default;
pub mod jaxrs;

pub use default::{default_contract, Body, HeaderMap, Headers, Param, QueryMap, RequestLine};

use crate::api::{annotation_type, downcast, AnnotatedMember, Annotation, InterfaceDef, Member, MethodDef};
use crate::metadata::MethodMetadata;
use crate::template::expression;
use crate::{Error, Result};
use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Parses interface descriptions into per-method metadata.
pub trait Contract: Send + Sync {
    /// Parses and validates every method of `interface`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Contract`] for the first method that cannot be turned into a
    /// request template.
    fn parse_and_validate(&self, interface: &InterfaceDef) -> Result<Vec<MethodMetadata>>;
}

/// Excludes a parameter from the HTTP request.
///
/// Use it for values the caller passes through for other reasons; an ignored parameter
/// never becomes the body.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ignore;

/// An aggregate parameter whose members each carry their own parameter annotations.
///
/// The argument is an object; each member's value is read from the field of the same
/// name.
///
/// # Examples
///
/// ```
/// use tether::contract::jaxrs::{HeaderParam, QueryParam};
/// use tether::contract::BeanParam;
/// use tether::Member;
///
/// let paging = BeanParam::new()
///     .member(Member::new("page").with(QueryParam::new("page")))
///     .member(Member::new("trace").with(HeaderParam::new("X-Trace")));
/// assert_eq!(paging.members().len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct BeanParam {
    members: Vec<Member>,
}

impl BeanParam {
    /// Creates an aggregate with no members.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a member.
    pub fn member(mut self, member: Member) -> Self {
        self.members.push(member);
        self
    }

    /// The members, in declaration order.
    pub fn members(&self) -> &[Member] {
        &self.members
    }
}

type AnnotationHandler = Box<dyn Fn(&dyn Annotation, &mut MethodMetadata) -> Result<()> + Send + Sync>;
type ParameterHandler =
    Box<dyn Fn(&dyn Annotation, &mut MethodMetadata, usize) -> Result<()> + Send + Sync>;

struct GuardedHandler {
    predicate: Box<dyn Fn(&dyn Annotation) -> bool + Send + Sync>,
    handler: AnnotationHandler,
}

impl GuardedHandler {
    fn for_type<A: Annotation>(
        handler: impl Fn(&A, &mut MethodMetadata) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            predicate: Box::new(|annotation: &dyn Annotation| {
                annotation_type(annotation) == TypeId::of::<A>()
            }),
            handler: Box::new(
                move |annotation: &dyn Annotation, data: &mut MethodMetadata| {
                    match downcast::<A>(annotation) {
                        Some(annotation) => handler(annotation, data),
                        None => Ok(()),
                    }
                },
            ),
        }
    }
}

/// The shared parsing skeleton plus a registry of annotation handlers.
///
/// Class-level annotations are processed before method-level ones, so method settings
/// override class defaults. Parameters are processed left to right. A parameter with no
/// recognized annotation becomes the request body. Every template variable must be bound
/// to a parameter, or parsing fails.
pub struct DeclarativeContract {
    name: String,
    class_handlers: Vec<GuardedHandler>,
    method_handlers: Vec<GuardedHandler>,
    parameter_handlers: HashMap<TypeId, ParameterHandler>,
}

impl DeclarativeContract {
    /// Creates a contract with no registered annotations.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class_handlers: Vec::new(),
            method_handlers: Vec::new(),
            parameter_handlers: HashMap::new(),
        }
    }

    /// The contract name, used in warnings.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a handler for an interface-level annotation.
    pub fn register_class_annotation<A: Annotation>(
        mut self,
        handler: impl Fn(&A, &mut MethodMetadata) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.class_handlers.push(GuardedHandler::for_type(handler));
        self
    }

    /// Registers a handler for a method-level annotation.
    pub fn register_method_annotation<A: Annotation>(
        mut self,
        handler: impl Fn(&A, &mut MethodMetadata) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.method_handlers.push(GuardedHandler::for_type(handler));
        self
    }

    /// Registers a handler for every method-level annotation matching `predicate`.
    pub fn register_method_annotation_matching(
        mut self,
        predicate: impl Fn(&dyn Annotation) -> bool + Send + Sync + 'static,
        handler: impl Fn(&dyn Annotation, &mut MethodMetadata) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.method_handlers.push(GuardedHandler {
            predicate: Box::new(predicate),
            handler: Box::new(handler),
        });
        self
    }

    /// Registers a handler for a parameter annotation. A later registration for the same
    /// annotation type replaces the earlier one.
    pub fn register_parameter_annotation<A: Annotation>(
        mut self,
        handler: impl Fn(&A, &mut MethodMetadata, usize) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.parameter_handlers.insert(
            TypeId::of::<A>(),
            Box::new(
                move |annotation: &dyn Annotation, data: &mut MethodMetadata, index: usize| {
                    match downcast::<A>(annotation) {
                        Some(annotation) => handler(annotation, data, index),
                        None => Ok(()),
                    }
                },
            ),
        );
        self
    }

    fn parse_method(&self, interface: &InterfaceDef, method: &MethodDef) -> Result<MethodMetadata> {
        let mut data = MethodMetadata::new(method.config_key(interface.name()), method.name());
        data.set_param_count(method.params().len());
        data.set_return_shape(method.return_shape());

        self.process_class(&mut data, interface)?;
        for annotation in method.annotations() {
            self.process_method_annotation(&mut data, annotation.as_ref())?;
        }

        if data.template().http_method().is_none() {
            return Err(contract_error(
                &data,
                format!(
                    "Method {} not annotated with HTTP method type (ex. GET, POST)",
                    data.config_key()
                ),
            ));
        }

        let mut next_synthetic = method.params().len();
        for (index, param) in method.params().iter().enumerate() {
            if param.has_annotation::<Ignore>() {
                data.ignore_param(index);
                continue;
            }

            if let Some(bean) = param.annotation::<BeanParam>() {
                for member in bean.members() {
                    let synthetic = next_synthetic;
                    next_synthetic += 1;
                    data.add_bean_member(synthetic, index, member.name());
                    if !self.process_parameter(&mut data, member, synthetic)? {
                        return Err(contract_error(
                            &data,
                            format!(
                                "BeanParam parameter {} has member {} without a supported annotation",
                                index,
                                member.name()
                            ),
                        ));
                    }
                }
                continue;
            }

            if self.process_parameter(&mut data, param, index)? {
                continue;
            }

            if !data.form_params().is_empty() {
                return Err(contract_error(
                    &data,
                    "Body parameters cannot be used with form parameters.".to_string(),
                ));
            }
            let body_type = param.declared_body_type();
            if let Err(e) = data.set_body_index(index, body_type) {
                return Err(with_warnings(&data, e));
            }
        }

        if data.body_index().is_some() && !data.form_params().is_empty() {
            return Err(contract_error(
                &data,
                "Body parameters cannot be used with form parameters.".to_string(),
            ));
        }

        for variable in data.template().variables() {
            if !data.is_bound(&variable) {
                return Err(contract_error(
                    &data,
                    format!(
                        "Method {} references template variable '{}' that no parameter provides",
                        data.config_key(),
                        variable
                    ),
                ));
            }
        }

        Ok(data)
    }

    fn process_class(&self, data: &mut MethodMetadata, interface: &InterfaceDef) -> Result<()> {
        let mut used = false;
        for annotation in interface.annotations() {
            for guarded in &self.class_handlers {
                if (guarded.predicate)(annotation.as_ref()) {
                    (guarded.handler)(annotation.as_ref(), data)?;
                    used = true;
                }
            }
        }
        if !used && !interface.annotations().is_empty() {
            let names = annotation_names(interface.annotations());
            data.warn(format!(
                "Interface {} has annotations {:?} that are not used by contract {}",
                interface.name(),
                names,
                self.name
            ));
        }
        Ok(())
    }

    fn process_method_annotation(
        &self,
        data: &mut MethodMetadata,
        annotation: &dyn Annotation,
    ) -> Result<()> {
        let mut used = false;
        for guarded in &self.method_handlers {
            if (guarded.predicate)(annotation) {
                (guarded.handler)(annotation, data)?;
                used = true;
            }
        }
        if !used {
            data.warn(format!(
                "Method {} has an annotation {:?} that is not used by contract {}",
                data.method_name(),
                annotation,
                self.name
            ));
        }
        Ok(())
    }

    /// Runs the handlers for a member's annotations. Returns `true` if any matched.
    fn process_parameter(
        &self,
        data: &mut MethodMetadata,
        member: &impl AnnotatedMember,
        index: usize,
    ) -> Result<bool> {
        let mut used = false;
        for annotation in member.annotations() {
            let annotation = annotation.as_ref();
            if let Some(handler) = self.parameter_handlers.get(&annotation_type(annotation)) {
                handler(annotation, data, index)?;
                used = true;
            }
        }
        if !used && !member.annotations().is_empty() {
            data.warn(format!(
                "Parameter {} has annotations {:?} that are not used by contract {}",
                member.name(),
                annotation_names(member.annotations()),
                self.name
            ));
        }
        Ok(used)
    }
}

impl Contract for DeclarativeContract {
    fn parse_and_validate(&self, interface: &InterfaceDef) -> Result<Vec<MethodMetadata>> {
        let mut seen = HashSet::new();
        let mut result = Vec::with_capacity(interface.methods().len());
        for method in interface.methods() {
            if !seen.insert(method.name()) {
                return Err(Error::Contract(format!(
                    "Interface {} declares method {} more than once",
                    interface.name(),
                    method.name()
                )));
            }
            let metadata = self.parse_method(interface, method)?;
            tracing::debug!(
                config_key = %metadata.config_key(),
                template = %metadata.template().path_and_query(),
                "Parsed method"
            );
            result.push(metadata);
        }
        Ok(result)
    }
}

impl fmt::Debug for DeclarativeContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeclarativeContract")
            .field("name", &self.name)
            .field("class_handlers", &self.class_handlers.len())
            .field("method_handlers", &self.method_handlers.len())
            .field("parameter_handlers", &self.parameter_handlers.len())
            .finish()
    }
}

fn annotation_names(annotations: &[Arc<dyn Annotation>]) -> Vec<String> {
    annotations
        .iter()
        .map(|annotation| format!("{:?}", annotation))
        .collect()
}

/// Builds a contract error, appending any warnings collected so far.
pub(crate) fn contract_error(data: &MethodMetadata, message: String) -> Error {
    if data.warnings().is_empty() {
        return Error::Contract(message);
    }
    let mut message = message;
    message.push_str("\nWarnings:");
    for warning in data.warnings() {
        message.push_str("\n- ");
        message.push_str(warning);
    }
    Error::Contract(message)
}

/// Appends collected warnings to a contract error raised by a metadata setter.
pub(crate) fn with_warnings(data: &MethodMetadata, error: Error) -> Error {
    match error {
        Error::Contract(message) => contract_error(data, message),
        other => other,
    }
}

/// Fails with a contract error when an annotation value is empty.
pub(crate) fn check_not_empty(value: &str, what: &str, data: &MethodMetadata) -> Result<()> {
    if value.trim().is_empty() {
        return Err(contract_error(
            data,
            format!("{} was empty on {}", what, data.config_key()),
        ));
    }
    Ok(())
}

/// Fails with a contract error unless `name` can appear as a `{name}` template variable.
pub(crate) fn check_variable_name(name: &str, what: &str, data: &MethodMetadata) -> Result<()> {
    check_not_empty(name, what, data)?;
    let variable = expression::single_expression(&format!("{{{}}}", name));
    if variable.as_deref() != Some(name) {
        return Err(contract_error(
            data,
            format!(
                "{} '{}' on {} cannot be used as a template variable",
                what,
                name,
                data.config_key()
            ),
        ));
    }
    Ok(())
}
