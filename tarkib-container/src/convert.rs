//! Conversion of raw values to declared types.
//!
//! The converter turns a [`Value`] into the representation a declared
//! [`TypeSpec`] expects, and prices how far from exact that conversion is.
//! Constructor resolution uses the weights to rank candidates: an exact
//! match costs 0, a registered trait cast 1, numeric widening 2, rendering
//! to string 3, parsing from string 4, and an impossible conversion is
//! [`UNASSIGNABLE`]. Weights over raw (unconverted) arguments are biased by
//! [`RAW_WEIGHT_BIAS`] so a candidate that fits without conversion wins ties.

use std::sync::Arc;

use crate::descriptor::{DescriptorRegistry, ParamSpec, TypeKind, TypeSpec};
use crate::error::{Result, TarkibError, WrongTypeError};
use crate::value::Value;

/// Cost of an impossible conversion. Kept far below `i64::MAX` so summing
/// per-argument weights cannot overflow.
pub(crate) const UNASSIGNABLE: i64 = i64::MAX / 4;

/// Subtracted from the raw-arguments weight so an exact raw fit is preferred
/// over an equally priced converted fit.
pub(crate) const RAW_WEIGHT_BIAS: i64 = 1024;

const EXACT: i64 = 0;
const CAST: i64 = 1;
const WIDEN: i64 = 2;
const RENDER: i64 = 3;
const PARSE: i64 = 4;

/// Converts raw definition values to declared parameter and property types.
#[derive(Clone)]
pub struct TypeConverter {
    descriptors: Arc<DescriptorRegistry>,
}

impl TypeConverter {
    pub fn new(descriptors: Arc<DescriptorRegistry>) -> Self {
        TypeConverter { descriptors }
    }

    /// Converts `value` to the representation `target` expects.
    ///
    /// `Value::Null` passes through every target; requiredness is the
    /// caller's concern.
    pub fn convert(&self, value: &Value, target: &TypeSpec) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        match target.kind() {
            TypeKind::Bool => match value {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                Value::Str(s) => s
                    .trim()
                    .parse::<bool>()
                    .map(Value::Bool)
                    .map_err(|_| self.mismatch(value, target)),
                _ => Err(self.mismatch(value, target)),
            },
            TypeKind::Int => match value {
                Value::Int(i) => Ok(Value::Int(*i)),
                Value::Float(x) if x.fract() == 0.0 => Ok(Value::Int(*x as i64)),
                Value::Str(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| self.mismatch(value, target)),
                _ => Err(self.mismatch(value, target)),
            },
            TypeKind::Float => match value {
                Value::Float(x) => Ok(Value::Float(*x)),
                Value::Int(i) => Ok(Value::Float(*i as f64)),
                Value::Str(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| self.mismatch(value, target)),
                _ => Err(self.mismatch(value, target)),
            },
            TypeKind::Str => match value {
                Value::Str(s) => Ok(Value::Str(s.clone())),
                Value::Int(i) => Ok(Value::Str(i.to_string())),
                Value::Float(x) => Ok(Value::Str(x.to_string())),
                Value::Bool(b) => Ok(Value::Str(b.to_string())),
                _ => Err(self.mismatch(value, target)),
            },
            TypeKind::Component => match value {
                Value::Instance(h) => match self.descriptors.cast(h, target) {
                    Some(cast) => Ok(Value::Instance(cast)),
                    None => Err(self.mismatch(value, target)),
                },
                _ => Err(self.mismatch(value, target)),
            },
            TypeKind::List(elem) => match value {
                Value::InstanceList(items) => {
                    let mut cast_items = Vec::with_capacity(items.len());
                    for h in items {
                        match self.descriptors.cast(h, elem) {
                            Some(c) => cast_items.push(c),
                            None => return Err(self.mismatch(value, target)),
                        }
                    }
                    Ok(Value::InstanceList(cast_items))
                }
                _ => Err(self.mismatch(value, target)),
            },
            TypeKind::Map(elem) => match value {
                Value::InstanceMap(items) => {
                    let mut cast_items = Vec::with_capacity(items.len());
                    for (k, h) in items {
                        match self.descriptors.cast(h, elem) {
                            Some(c) => cast_items.push((k.clone(), c)),
                            None => return Err(self.mismatch(value, target)),
                        }
                    }
                    Ok(Value::InstanceMap(cast_items))
                }
                _ => Err(self.mismatch(value, target)),
            },
            TypeKind::Provider => match value {
                Value::Provider(p) => Ok(Value::Provider(p.clone())),
                _ => Err(self.mismatch(value, target)),
            },
        }
    }

    /// The type-difference weight of using `value` for `target` without
    /// performing the conversion.
    pub fn weight(&self, value: &Value, target: &TypeSpec) -> i64 {
        if value.is_null() {
            return EXACT;
        }

        match target.kind() {
            TypeKind::Bool => match value {
                Value::Bool(_) => EXACT,
                Value::Str(s) if s.trim().parse::<bool>().is_ok() => PARSE,
                _ => UNASSIGNABLE,
            },
            TypeKind::Int => match value {
                Value::Int(_) => EXACT,
                Value::Float(x) if x.fract() == 0.0 => WIDEN,
                Value::Str(s) if s.trim().parse::<i64>().is_ok() => PARSE,
                _ => UNASSIGNABLE,
            },
            TypeKind::Float => match value {
                Value::Float(_) => EXACT,
                Value::Int(_) => WIDEN,
                Value::Str(s) if s.trim().parse::<f64>().is_ok() => PARSE,
                _ => UNASSIGNABLE,
            },
            TypeKind::Str => match value {
                Value::Str(_) => EXACT,
                Value::Int(_) | Value::Float(_) | Value::Bool(_) => RENDER,
                _ => UNASSIGNABLE,
            },
            TypeKind::Component => match value {
                Value::Instance(h) => {
                    let source = crate::value::handle_type_id(h);
                    if source == target.id() {
                        EXACT
                    } else if self.descriptors.assignable(source, target) {
                        CAST
                    } else {
                        UNASSIGNABLE
                    }
                }
                _ => UNASSIGNABLE,
            },
            TypeKind::List(elem) => match value {
                Value::InstanceList(items) => self.collection_weight(elem, items.iter()),
                _ => UNASSIGNABLE,
            },
            TypeKind::Map(elem) => match value {
                Value::InstanceMap(items) => {
                    self.collection_weight(elem, items.iter().map(|(_, h)| h))
                }
                _ => UNASSIGNABLE,
            },
            TypeKind::Provider => match value {
                Value::Provider(_) => EXACT,
                _ => UNASSIGNABLE,
            },
        }
    }

    /// Summed weight of an argument array against a parameter list.
    pub fn arguments_weight(&self, params: &[ParamSpec], args: &[Value]) -> i64 {
        if params.len() != args.len() {
            return UNASSIGNABLE;
        }
        params
            .iter()
            .zip(args)
            .map(|(p, a)| self.weight(a, &p.ty))
            .fold(0i64, |acc, w| acc.saturating_add(w))
            .min(UNASSIGNABLE)
    }

    fn collection_weight<'a>(
        &self,
        elem: &TypeSpec,
        items: impl Iterator<Item = &'a crate::value::BeanHandle>,
    ) -> i64 {
        let mut worst = EXACT;
        for h in items {
            let source = crate::value::handle_type_id(h);
            let w = if source == elem.id() {
                EXACT
            } else if self.descriptors.assignable(source, elem) {
                CAST
            } else {
                return UNASSIGNABLE;
            };
            worst = worst.max(w);
        }
        worst
    }

    fn mismatch(&self, value: &Value, target: &TypeSpec) -> TarkibError {
        let actual = match value {
            Value::Instance(h) => self.descriptors_name(h),
            other => other.kind_name().to_owned(),
        };
        TarkibError::WrongType(WrongTypeError {
            name: String::from("<value>"),
            expected: target.to_string(),
            actual,
        })
    }

    fn descriptors_name(&self, h: &crate::value::BeanHandle) -> String {
        self.descriptors.name_of_handle(h)
    }
}
