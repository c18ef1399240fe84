//! A JAX-RS style vocabulary.
//!
//! ```
//! use tether::contract::jaxrs::{self, Path, PathParam, Produces, QueryParam, GET};
//! use tether::contract::Contract;
//! use tether::{InterfaceDef, MethodDef, ParamDef, ReturnShape};
//!
//! let api = InterfaceDef::new("Repos")
//!     .with(Path::new("/repos"))
//!     .with(Produces::new(["application/json"]))
//!     .method(
//!         MethodDef::new("issues")
//!             .with(GET)
//!             .with(Path::new("{owner}/{repo: [a-z-]+}/issues"))
//!             .param(ParamDef::new("owner").with(PathParam::new("owner")))
//!             .param(ParamDef::new("repo").with(PathParam::new("repo")))
//!             .param(ParamDef::new("state").with(QueryParam::new("state")))
//!             .returns(ReturnShape::List),
//!     );
//!
//! let methods = jaxrs::contract().parse_and_validate(&api)?;
//! assert_eq!(
//!     methods[0].template().path_and_query(),
//!     "/repos/{owner}/{repo}/issues?state={state}"
//! );
//! # Ok::<(), tether::Error>(())
//! ```

use super::{
    check_not_empty, check_variable_name, contract_error, with_warnings, DeclarativeContract,
};
use crate::api::{downcast, Annotation};
use crate::expander::{DefaultValueExpander, Expander, ToStringExpander};
use crate::metadata::MethodMetadata;
use crate::Result;
use http::Method;
use std::sync::Arc;

macro_rules! named_annotation {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name(pub String);

        impl $name {
            /// Creates the annotation with the given value.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }
        }
    };
}

macro_rules! verb_annotation {
    ($name:ident) => {
        #[doc = concat!("The `", stringify!($name), "` HTTP method.")]
        #[allow(clippy::upper_case_acronyms)]
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;
    };
}

named_annotation!(
    /// A path on an interface (base path) or a method (appended to the base path).
    ///
    /// Whitespace and regular expressions inside `{name: regex}` are stripped.
    Path
);
named_annotation!(
    /// Binds a parameter to a path variable.
    PathParam
);
named_annotation!(
    /// Binds a parameter to a query parameter of the same name.
    QueryParam
);
named_annotation!(
    /// Binds a parameter to a header of the same name.
    HeaderParam
);
named_annotation!(
    /// Binds a parameter to a form field.
    FormParam
);
named_annotation!(
    /// Binds a parameter to a cookie sent in the `Cookie` header.
    CookieParam
);
named_annotation!(
    /// Binds a parameter to a matrix variable written into the path.
    MatrixParam
);
named_annotation!(
    /// The value used when the argument is `null`.
    DefaultValue
);

verb_annotation!(GET);
verb_annotation!(POST);
verb_annotation!(PUT);
verb_annotation!(DELETE);
verb_annotation!(PATCH);
verb_annotation!(HEAD);
verb_annotation!(OPTIONS);

/// Marks arguments as already percent-encoded. On an interface or method it applies to
/// every parameter.
#[derive(Debug, Clone, Copy, Default)]
pub struct Encoded;

/// Media types the request body is sent as (`Content-Type`).
#[derive(Debug, Clone)]
pub struct Consumes(pub Vec<String>);

impl Consumes {
    /// Creates the annotation from media types.
    pub fn new<I, S>(media_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(media_types.into_iter().map(Into::into).collect())
    }
}

/// Media types accepted in the response (`Accept`).
#[derive(Debug, Clone)]
pub struct Produces(pub Vec<String>);

impl Produces {
    /// Creates the annotation from media types.
    pub fn new<I, S>(media_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(media_types.into_iter().map(Into::into).collect())
    }
}

fn verb_of(annotation: &dyn Annotation) -> Option<Method> {
    if downcast::<GET>(annotation).is_some() {
        Some(Method::GET)
    } else if downcast::<POST>(annotation).is_some() {
        Some(Method::POST)
    } else if downcast::<PUT>(annotation).is_some() {
        Some(Method::PUT)
    } else if downcast::<DELETE>(annotation).is_some() {
        Some(Method::DELETE)
    } else if downcast::<PATCH>(annotation).is_some() {
        Some(Method::PATCH)
    } else if downcast::<HEAD>(annotation).is_some() {
        Some(Method::HEAD)
    } else if downcast::<OPTIONS>(annotation).is_some() {
        Some(Method::OPTIONS)
    } else {
        None
    }
}

/// Rewrites `{ name : regex }` to `{name}`.
fn strip_path_expressions(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut rest = path;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let mut depth = 0;
        let mut end = None;
        for (offset, c) in rest[start..].char_indices() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(start + offset);
                        break;
                    }
                }
                _ => {}
            }
        }
        let Some(end) = end else {
            out.push_str(&rest[start..]);
            return out;
        };
        let inner = &rest[start + 1..end];
        let name = inner.split(':').next().unwrap_or(inner).trim();
        out.push('{');
        out.push_str(name);
        out.push('}');
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    out
}

fn media_types(values: &[String], what: &str, data: &MethodMetadata) -> Result<Vec<String>> {
    let values: Vec<String> = values
        .iter()
        .filter(|value| !value.trim().is_empty())
        .cloned()
        .collect();
    if values.is_empty() {
        return Err(contract_error(
            data,
            format!("{}.value() was empty on {}", what, data.config_key()),
        ));
    }
    Ok(values)
}

fn consumes(consumes: &Consumes, data: &mut MethodMetadata) -> Result<()> {
    let values = media_types(&consumes.0, "Consumes", data)?;
    data.template_mut().set_header("Content-Type", values);
    Ok(())
}

fn produces(produces: &Produces, data: &mut MethodMetadata) -> Result<()> {
    let values = media_types(&produces.0, "Produces", data)?;
    data.template_mut().set_header("Accept", values);
    Ok(())
}

fn encoded_everywhere(_: &Encoded, data: &mut MethodMetadata) -> Result<()> {
    data.mark_all_encoded();
    Ok(())
}

fn templated(name: &str) -> String {
    format!("{{{}}}", name)
}

/// The JAX-RS vocabulary.
///
/// Parameter annotations can appear in any order; [`DefaultValue`] wraps whatever
/// expander the parameter ends up with.
pub fn contract() -> DeclarativeContract {
    DeclarativeContract::new("JAXRS")
        .register_class_annotation(|path: &Path, data| {
            if path.0.is_empty() {
                return Ok(());
            }
            let mut value = strip_path_expressions(&path.0);
            if !value.starts_with('/') {
                value.insert(0, '/');
            }
            if value.ends_with('/') {
                value.pop();
            }
            data.template_mut().uri(&value);
            Ok(())
        })
        .register_class_annotation(consumes)
        .register_class_annotation(produces)
        .register_class_annotation(encoded_everywhere)
        .register_method_annotation_matching(
            |annotation| verb_of(annotation).is_some(),
            |annotation, data| match verb_of(annotation) {
                Some(verb) => data
                    .set_http_method(verb)
                    .map_err(|e| with_warnings(data, e)),
                None => Ok(()),
            },
        )
        .register_method_annotation(|path: &Path, data| {
            if path.0.trim().is_empty() {
                return Ok(());
            }
            let mut value = strip_path_expressions(&path.0);
            if !value.starts_with('/') && !data.template().path().ends_with('/') {
                value.insert(0, '/');
            }
            data.template_mut().append_uri(&value);
            Ok(())
        })
        .register_method_annotation(consumes)
        .register_method_annotation(produces)
        .register_method_annotation(encoded_everywhere)
        .register_parameter_annotation(|param: &PathParam, data, index| {
            check_variable_name(&param.0, "PathParam.value()", data)?;
            data.name_param(index, param.0.clone());
            Ok(())
        })
        .register_parameter_annotation(|param: &QueryParam, data, index| {
            check_variable_name(&param.0, "QueryParam.value()", data)?;
            data.template_mut().query(&param.0, [templated(&param.0)]);
            data.name_param(index, param.0.clone());
            Ok(())
        })
        .register_parameter_annotation(|param: &HeaderParam, data, index| {
            check_variable_name(&param.0, "HeaderParam.value()", data)?;
            data.template_mut().header(&param.0, [templated(&param.0)]);
            data.name_param(index, param.0.clone());
            Ok(())
        })
        .register_parameter_annotation(|param: &FormParam, data, index| {
            check_not_empty(&param.0, "FormParam.value()", data)?;
            data.add_form_param(param.0.clone());
            data.name_param(index, param.0.clone());
            Ok(())
        })
        .register_parameter_annotation(|param: &CookieParam, data, index| {
            check_variable_name(&param.0, "CookieParam.value()", data)?;
            let cookie = format!("{}={}", param.0, templated(&param.0));
            data.template_mut().header("Cookie", [cookie]);
            data.name_param(index, param.0.clone());
            Ok(())
        })
        .register_parameter_annotation(|param: &MatrixParam, data, index| {
            check_variable_name(&param.0, "MatrixParam.value()", data)?;
            data.name_param(index, param.0.clone());
            Ok(())
        })
        .register_parameter_annotation(|default: &DefaultValue, data, index| {
            let delegate: Arc<dyn Expander> = data
                .expander(index)
                .cloned()
                .unwrap_or_else(|| Arc::new(ToStringExpander));
            data.set_expander(
                index,
                Arc::new(DefaultValueExpander::new(default.0.clone(), delegate)),
            );
            Ok(())
        })
        .register_parameter_annotation(|_: &Encoded, data, index| {
            data.mark_encoded(index);
            Ok(())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{BeanParam, Contract};
    use crate::{InterfaceDef, Member, MethodDef, ParamDef};

    fn parse(api: InterfaceDef) -> Result<Vec<MethodMetadata>> {
        contract().parse_and_validate(&api)
    }

    #[test]
    fn test_strip_path_expressions() {
        assert_eq!(strip_path_expressions("/{ id }"), "/{id}");
        assert_eq!(strip_path_expressions("/{id: [0-9]+}/x"), "/{id}/x");
        assert_eq!(strip_path_expressions("/{id:[0-9]{3}}"), "/{id}");
        assert_eq!(strip_path_expressions("/plain"), "/plain");
    }

    #[test]
    fn test_class_and_method_paths() {
        let methods = parse(
            InterfaceDef::new("Api")
                .with(Path::new("base/"))
                .method(MethodDef::new("list").with(GET).with(Path::new("items"))),
        )
        .unwrap();
        assert_eq!(methods[0].template().path(), "/base/items");
    }

    #[test]
    fn test_param_names_with_symbols() {
        let methods = parse(
            InterfaceDef::new("Api").method(
                MethodDef::new("list")
                    .with(GET)
                    .with(Path::new("/items"))
                    .param(ParamDef::new("status").with(QueryParam::new("filter[status]"))),
            ),
        )
        .unwrap();
        assert_eq!(
            methods[0].template().query_values("filter[status]").unwrap(),
            ["{filter[status]}"]
        );
        assert!(methods[0].is_bound("filter[status]"));
    }

    #[test]
    fn test_unusable_param_name_rejected() {
        let err = parse(
            InterfaceDef::new("Api").method(
                MethodDef::new("list")
                    .with(GET)
                    .with(Path::new("/items"))
                    .param(ParamDef::new("status").with(QueryParam::new("filter status"))),
            ),
        )
        .unwrap_err();
        assert!(err.to_string().contains("cannot be used as a template variable"));
    }

    #[test]
    fn test_multiple_verbs_rejected() {
        let err = parse(
            InterfaceDef::new("Api").method(MethodDef::new("list").with(GET).with(POST)),
        )
        .unwrap_err();
        assert!(err.to_string().contains("contains multiple HTTP methods"));
    }

    #[test]
    fn test_repeated_verb_rejected() {
        let err = parse(
            InterfaceDef::new("Api").method(
                MethodDef::new("list")
                    .with(GET)
                    .with(Path::new("/a"))
                    .with(GET),
            ),
        )
        .unwrap_err();
        assert!(err.to_string().contains("contains multiple HTTP methods"));
    }

    #[test]
    fn test_empty_produces_rejected() {
        let err = parse(
            InterfaceDef::new("Api").method(
                MethodDef::new("list")
                    .with(GET)
                    .with(Produces::new([""])),
            ),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Produces.value() was empty"));
    }

    #[test]
    fn test_method_produces_overrides_class() {
        let methods = parse(
            InterfaceDef::new("Api")
                .with(Produces::new(["text/plain"]))
                .method(
                    MethodDef::new("list")
                        .with(GET)
                        .with(Produces::new(["application/json"])),
                ),
        )
        .unwrap();
        assert_eq!(
            methods[0].template().header_values("Accept").unwrap(),
            ["application/json"]
        );
    }

    #[test]
    fn test_header_cookie_and_form_params() {
        let methods = parse(
            InterfaceDef::new("Api").method(
                MethodDef::new("login")
                    .with(POST)
                    .with(Path::new("/login"))
                    .param(ParamDef::new("trace").with(HeaderParam::new("X-Trace")))
                    .param(ParamDef::new("session").with(CookieParam::new("session")))
                    .param(ParamDef::new("user").with(FormParam::new("user"))),
            ),
        )
        .unwrap();
        let data = &methods[0];
        assert_eq!(data.template().header_values("X-Trace").unwrap(), ["{X-Trace}"]);
        assert_eq!(
            data.template().header_values("Cookie").unwrap(),
            ["session={session}"]
        );
        assert_eq!(data.form_params(), ["user"]);
    }

    #[test]
    fn test_default_value_wraps_expander() {
        let methods = parse(
            InterfaceDef::new("Api").method(
                MethodDef::new("list")
                    .with(GET)
                    .param(
                        ParamDef::new("limit")
                            .with(DefaultValue::new("10"))
                            .with(QueryParam::new("limit")),
                    ),
            ),
        )
        .unwrap();
        let expander = methods[0].expander(0).unwrap();
        assert_eq!(expander.expand(&serde_json::Value::Null), Some("10".to_string()));
    }

    #[test]
    fn test_encoded_on_class() {
        let methods = parse(
            InterfaceDef::new("Api").with(Encoded).method(
                MethodDef::new("get")
                    .with(GET)
                    .with(Path::new("/{id}"))
                    .param(ParamDef::new("id").with(PathParam::new("id"))),
            ),
        )
        .unwrap();
        assert!(methods[0].is_encoded(0));
    }

    #[test]
    fn test_bean_param_members_get_synthetic_indices() {
        let paging = BeanParam::new()
            .member(Member::new("page").with(QueryParam::new("page")))
            .member(Member::new("trace").with(HeaderParam::new("X-Trace")));
        let methods = parse(
            InterfaceDef::new("Api").method(
                MethodDef::new("list")
                    .with(GET)
                    .with(Path::new("/items/{kind}"))
                    .param(ParamDef::new("kind").with(PathParam::new("kind")))
                    .param(ParamDef::new("paging").with(paging)),
            ),
        )
        .unwrap();

        let data = &methods[0];
        assert_eq!(data.index_to_name()[&0], ["kind"]);
        assert_eq!(data.index_to_name()[&2], ["page"]);
        assert_eq!(data.index_to_name()[&3], ["X-Trace"]);
        assert_eq!(data.bean_member(2), Some((1, "page")));
        assert_eq!(data.body_index(), None);
    }
}
