//! Interface descriptions.
//!
//! An interface is described with plain values instead of reflection: an [`InterfaceDef`]
//! holds [`MethodDef`]s, which hold [`ParamDef`]s, and each level carries annotations.
//! Annotations are ordinary structs; a [`Contract`](crate::contract::Contract) decides
//! which ones it understands.
//!
//! # Examples
//!
//! ```
//! use tether::contract::{Param, RequestLine};
//! use tether::{InterfaceDef, MethodDef, ParamDef, ReturnShape};
//!
//! let github = InterfaceDef::new("GitHub").method(
//!     MethodDef::new("contributors")
//!         .with(RequestLine::new("GET /repos/{owner}/{repo}/contributors"))
//!         .param(ParamDef::new("owner").with(Param::new("owner")))
//!         .param(ParamDef::new("repo").with(Param::new("repo")))
//!         .returns(ReturnShape::List),
//! );
//!
//! assert_eq!(github.methods().len(), 1);
//! assert_eq!(github.methods()[0].config_key("GitHub"), "GitHub#contributors(owner,repo)");
//! ```

use crate::metadata::{BodyType, ReturnShape};
use std::any::{Any, TypeId};
use std::fmt::Debug;
use std::sync::Arc;

/// A marker attached to an interface, method, parameter or bean member.
///
/// Any `'static` type that is `Send + Sync + Debug` is an annotation.
pub trait Annotation: Any + Send + Sync + Debug {
    /// Returns `self` as [`Any`] so contracts can downcast it.
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Send + Sync + Debug> Annotation for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Returns the concrete type of an annotation.
pub(crate) fn annotation_type(annotation: &dyn Annotation) -> TypeId {
    annotation.as_any().type_id()
}

/// Downcasts an annotation to a concrete type.
pub fn downcast<A: Annotation>(annotation: &dyn Annotation) -> Option<&A> {
    annotation.as_any().downcast_ref::<A>()
}

/// A named member that carries annotations.
///
/// Method parameters and the members of a [`BeanParam`](crate::contract::BeanParam)
/// both implement this, so the contract parser treats them the same way.
pub trait AnnotatedMember {
    /// The member name.
    fn name(&self) -> &str;

    /// The annotations on the member, in declaration order.
    fn annotations(&self) -> &[Arc<dyn Annotation>];

    /// Returns the first annotation of type `A`.
    fn annotation<A: Annotation>(&self) -> Option<&A>
    where
        Self: Sized,
    {
        self.annotations()
            .iter()
            .find_map(|annotation| downcast::<A>(annotation.as_ref()))
    }

    /// Returns `true` if the member carries an annotation of type `A`.
    fn has_annotation<A: Annotation>(&self) -> bool
    where
        Self: Sized,
    {
        self.annotation::<A>().is_some()
    }
}

/// A described interface: a name, class-level annotations and methods.
#[derive(Debug, Clone)]
pub struct InterfaceDef {
    name: String,
    annotations: Vec<Arc<dyn Annotation>>,
    methods: Vec<MethodDef>,
}

impl InterfaceDef {
    /// Creates an interface with no methods.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            annotations: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Adds a class-level annotation.
    pub fn with(mut self, annotation: impl Annotation) -> Self {
        self.annotations.push(Arc::new(annotation));
        self
    }

    /// Adds a method.
    pub fn method(mut self, method: MethodDef) -> Self {
        self.methods.push(method);
        self
    }

    /// The interface name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The class-level annotations.
    pub fn annotations(&self) -> &[Arc<dyn Annotation>] {
        &self.annotations
    }

    /// The methods, in declaration order.
    pub fn methods(&self) -> &[MethodDef] {
        &self.methods
    }
}

/// A described method.
#[derive(Debug, Clone)]
pub struct MethodDef {
    name: String,
    annotations: Vec<Arc<dyn Annotation>>,
    params: Vec<ParamDef>,
    returns: ReturnShape,
}

impl MethodDef {
    /// Creates a method with no parameters that returns nothing.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            annotations: Vec::new(),
            params: Vec::new(),
            returns: ReturnShape::Unit,
        }
    }

    /// Adds a method-level annotation.
    pub fn with(mut self, annotation: impl Annotation) -> Self {
        self.annotations.push(Arc::new(annotation));
        self
    }

    /// Appends a parameter.
    pub fn param(mut self, param: ParamDef) -> Self {
        self.params.push(param);
        self
    }

    /// Sets the shape of the return value.
    pub fn returns(mut self, shape: ReturnShape) -> Self {
        self.returns = shape;
        self
    }

    /// The method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The method-level annotations.
    pub fn annotations(&self) -> &[Arc<dyn Annotation>] {
        &self.annotations
    }

    /// The parameters, in declaration order.
    pub fn params(&self) -> &[ParamDef] {
        &self.params
    }

    /// The declared return shape.
    pub fn return_shape(&self) -> ReturnShape {
        self.returns
    }

    /// The configuration key, `Interface#method(param,param)`.
    pub fn config_key(&self, interface: &str) -> String {
        let params: Vec<&str> = self.params.iter().map(ParamDef::name).collect();
        format!("{}#{}({})", interface, self.name, params.join(","))
    }
}

/// A described method parameter.
#[derive(Debug, Clone)]
pub struct ParamDef {
    name: String,
    annotations: Vec<Arc<dyn Annotation>>,
    body_type: BodyType,
}

impl ParamDef {
    /// Creates a parameter with no annotations.
    ///
    /// An unannotated parameter becomes the request body.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            annotations: Vec::new(),
            body_type: BodyType::Json,
        }
    }

    /// Adds an annotation.
    pub fn with(mut self, annotation: impl Annotation) -> Self {
        self.annotations.push(Arc::new(annotation));
        self
    }

    /// Sets how the parameter is encoded when it is the request body.
    pub fn body_type(mut self, body_type: BodyType) -> Self {
        self.body_type = body_type;
        self
    }

    /// The declared body type.
    pub fn declared_body_type(&self) -> BodyType {
        self.body_type
    }
}

impl AnnotatedMember for ParamDef {
    fn name(&self) -> &str {
        &self.name
    }

    fn annotations(&self) -> &[Arc<dyn Annotation>] {
        &self.annotations
    }
}

/// One member of an aggregate parameter.
///
/// The member's value is read from the field of the same name on the argument object.
#[derive(Debug, Clone)]
pub struct Member {
    name: String,
    annotations: Vec<Arc<dyn Annotation>>,
}

impl Member {
    /// Creates a member with no annotations.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            annotations: Vec::new(),
        }
    }

    /// Adds an annotation.
    pub fn with(mut self, annotation: impl Annotation) -> Self {
        self.annotations.push(Arc::new(annotation));
        self
    }
}

impl AnnotatedMember for Member {
    fn name(&self) -> &str {
        &self.name
    }

    fn annotations(&self) -> &[Arc<dyn Annotation>] {
        &self.annotations
    }
}
