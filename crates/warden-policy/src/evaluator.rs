//! Condition expression evaluation.
//!
//! Evaluation is strict: operators check the variant of every operand and
//! fail with [`EvalError`] instead of coercing. `&&`, `||`, `if` and
//! `is ... in` evaluate left to right and stop as soon as the result is known,
//! so an operand that is never reached cannot produce an error.

use std::collections::{BTreeMap, BTreeSet};

use warden_types::{EntityStore, EntityUid, Value};

use crate::ast::{BinaryOp, Expr, PatternElem, Var};
use crate::error::EvalError;

/// Result type for expression evaluation.
pub type Result<T> = std::result::Result<T, EvalError>;

// ============================================================================
// Environment
// ============================================================================

/// Bindings visible to a condition expression.
#[derive(Debug, Clone, Copy)]
pub struct Env<'a> {
    pub principal: &'a EntityUid,
    pub action: &'a EntityUid,
    pub resource: &'a EntityUid,
    pub context: &'a BTreeMap<String, Value>,
    pub entities: &'a EntityStore,
}

// ============================================================================
// Public API
// ============================================================================

/// Evaluates `expr` against `env`.
pub fn evaluate(expr: &Expr, env: &Env<'_>) -> Result<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Var(var) => Ok(match var {
            Var::Principal => Value::EntityRef(env.principal.clone()),
            Var::Action => Value::EntityRef(env.action.clone()),
            Var::Resource => Value::EntityRef(env.resource.clone()),
            Var::Context => Value::Record(env.context.clone()),
        }),
        Expr::Name(name) => Err(EvalError::UndeclaredName { name: name.clone() }),

        Expr::Not(inner) => Ok(Value::Bool(!evaluate_bool(inner, env)?)),
        Expr::Neg(inner) => {
            let n = expect_long(evaluate(inner, env)?)?;
            n.checked_neg()
                .map(Value::Long)
                .ok_or(EvalError::IntegerOverflow { op: "-" })
        }

        Expr::And(lhs, rhs) => {
            if !evaluate_bool(lhs, env)? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(evaluate_bool(rhs, env)?))
        }
        Expr::Or(lhs, rhs) => {
            if evaluate_bool(lhs, env)? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(evaluate_bool(rhs, env)?))
        }

        Expr::Binary { op, lhs, rhs } => {
            let lhs = evaluate(lhs, env)?;
            let rhs = evaluate(rhs, env)?;
            binary(*op, lhs, rhs, env.entities)
        }

        Expr::If {
            cond,
            then_expr,
            else_expr,
        } => {
            if evaluate_bool(cond, env)? {
                evaluate(then_expr, env)
            } else {
                evaluate(else_expr, env)
            }
        }

        Expr::GetAttr { expr, attr } => get_attr(evaluate(expr, env)?, attr, env.entities),
        Expr::HasAttr { expr, attr } => {
            let present = match evaluate(expr, env)? {
                Value::Record(fields) => fields.contains_key(attr),
                // Missing entities simply have no attributes.
                Value::EntityRef(uid) => env
                    .entities
                    .get(&uid)
                    .is_some_and(|entity| entity.attr(attr).is_some()),
                other => {
                    return Err(EvalError::type_mismatch(
                        "entity or record",
                        other.type_name(),
                    ));
                }
            };
            Ok(Value::Bool(present))
        }

        Expr::Like { expr, pattern } => match evaluate(expr, env)? {
            Value::String(s) => Ok(Value::Bool(wildcard_matches(pattern, &s))),
            other => Err(EvalError::type_mismatch("string", other.type_name())),
        },

        Expr::Is {
            expr,
            entity_type,
            in_expr,
        } => {
            let uid = expect_entity(evaluate(expr, env)?)?;
            if uid.entity_type() != entity_type {
                return Ok(Value::Bool(false));
            }
            match in_expr {
                None => Ok(Value::Bool(true)),
                Some(target) => {
                    let target = evaluate(target, env)?;
                    Ok(Value::Bool(entity_in(&uid, &target, env.entities)?))
                }
            }
        }

        Expr::Set(items) => items
            .iter()
            .map(|item| evaluate(item, env))
            .collect::<Result<BTreeSet<_>>>()
            .map(Value::Set),
        Expr::Record(fields) => fields
            .iter()
            .map(|(key, value)| Ok((key.clone(), evaluate(value, env)?)))
            .collect::<Result<BTreeMap<_, _>>>()
            .map(Value::Record),

        Expr::MethodCall {
            receiver,
            method,
            args,
        } => method_call(receiver, method, args, env),
        Expr::Call { name, .. } => Err(EvalError::UndeclaredName { name: name.clone() }),
    }
}

/// Evaluates `expr` and requires a boolean result.
pub fn evaluate_bool(expr: &Expr, env: &Env<'_>) -> Result<bool> {
    match evaluate(expr, env)? {
        Value::Bool(b) => Ok(b),
        other => Err(EvalError::type_mismatch("bool", other.type_name())),
    }
}

// ============================================================================
// Operators
// ============================================================================

fn binary(op: BinaryOp, lhs: Value, rhs: Value, entities: &EntityStore) -> Result<Value> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(lhs == rhs)),
        BinaryOp::NotEq => Ok(Value::Bool(lhs != rhs)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let (a, b) = (expect_long(lhs)?, expect_long(rhs)?);
            Ok(Value::Bool(match op {
                BinaryOp::Lt => a < b,
                BinaryOp::Le => a <= b,
                BinaryOp::Gt => a > b,
                _ => a >= b,
            }))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => {
            let (a, b) = (expect_long(lhs)?, expect_long(rhs)?);
            let result = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                _ => a.checked_mul(b),
            };
            result
                .map(Value::Long)
                .ok_or(EvalError::IntegerOverflow { op: op.symbol() })
        }
        BinaryOp::In => {
            let uid = expect_entity(lhs)?;
            Ok(Value::Bool(entity_in(&uid, &rhs, entities)?))
        }
    }
}

/// `uid in target`: `target` is an entity or a set of entities.
fn entity_in(uid: &EntityUid, target: &Value, entities: &EntityStore) -> Result<bool> {
    match target {
        Value::EntityRef(ancestor) => Ok(entities.is_ancestor(ancestor, uid)),
        Value::Set(members) => {
            let mut found = false;
            for member in members {
                // Every member is type-checked, even after a match.
                let ancestor = member
                    .as_entity()
                    .ok_or_else(|| EvalError::type_mismatch("set of entities", member.type_name()))?;
                found = found || entities.is_ancestor(ancestor, uid);
            }
            Ok(found)
        }
        other => Err(EvalError::type_mismatch(
            "entity or set of entities",
            other.type_name(),
        )),
    }
}

fn get_attr(target: Value, attr: &str, entities: &EntityStore) -> Result<Value> {
    match target {
        Value::Record(mut fields) => fields
            .remove(attr)
            .ok_or_else(|| EvalError::AttributeNotFound {
                attr: attr.to_string(),
                on: "record".to_string(),
            }),
        Value::EntityRef(uid) => {
            let entity = entities.get(&uid).ok_or_else(|| EvalError::EntityNotFound {
                uid: uid.to_string(),
            })?;
            entity
                .attr(attr)
                .cloned()
                .ok_or_else(|| EvalError::AttributeNotFound {
                    attr: attr.to_string(),
                    on: uid.to_string(),
                })
        }
        other => Err(EvalError::type_mismatch(
            "entity or record",
            other.type_name(),
        )),
    }
}

// ============================================================================
// Methods
// ============================================================================

fn method_call(receiver: &Expr, method: &str, args: &[Expr], env: &Env<'_>) -> Result<Value> {
    let arity = match method {
        "contains" | "containsAll" | "containsAny" => 1,
        "isEmpty" => 0,
        _ => {
            return Err(EvalError::UndeclaredName {
                name: method.to_string(),
            });
        }
    };
    if args.len() != arity {
        return Err(EvalError::WrongArity {
            method: method.to_string(),
            expected: arity,
            actual: args.len(),
        });
    }

    let set = expect_set(evaluate(receiver, env)?)?;
    let result = match method {
        "isEmpty" => set.is_empty(),
        "contains" => set.contains(&evaluate(&args[0], env)?),
        "containsAll" => {
            let other = expect_set(evaluate(&args[0], env)?)?;
            other.is_subset(&set)
        }
        _ => {
            let other = expect_set(evaluate(&args[0], env)?)?;
            !other.is_disjoint(&set)
        }
    };
    Ok(Value::Bool(result))
}

// ============================================================================
// Pattern Matching
// ============================================================================

/// Matches `value` against a compiled `like` pattern.
///
/// `Wildcard` matches zero or more characters. Iterative with single-point
/// backtracking, so runtime is bounded by `pattern.len() * value.len()`.
fn wildcard_matches(pattern: &[PatternElem], value: &str) -> bool {
    let value: Vec<char> = value.chars().collect();
    let (mut p, mut v) = (0, 0);
    // Position after the last wildcard seen, and the value index it resumes at.
    let mut resume: Option<(usize, usize)> = None;

    while v < value.len() {
        match pattern.get(p) {
            Some(PatternElem::Wildcard) => {
                p += 1;
                resume = Some((p, v));
            }
            Some(PatternElem::Char(c)) if *c == value[v] => {
                p += 1;
                v += 1;
            }
            _ => match resume {
                Some((rp, rv)) => {
                    p = rp;
                    v = rv + 1;
                    resume = Some((rp, rv + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..]
        .iter()
        .all(|elem| matches!(elem, PatternElem::Wildcard))
}

// ============================================================================
// Helpers
// ============================================================================

fn expect_long(value: Value) -> Result<i64> {
    match value {
        Value::Long(n) => Ok(n),
        other => Err(EvalError::type_mismatch("long", other.type_name())),
    }
}

fn expect_entity(value: Value) -> Result<EntityUid> {
    match value {
        Value::EntityRef(uid) => Ok(uid),
        other => Err(EvalError::type_mismatch("entity", other.type_name())),
    }
}

fn expect_set(value: Value) -> Result<BTreeSet<Value>> {
    match value {
        Value::Set(set) => Ok(set),
        other => Err(EvalError::type_mismatch("set", other.type_name())),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvalErrorKind;
    use crate::parser::parse_expression;
    use test_case::test_case;
    use warden_types::Entity;

    struct Fixture {
        principal: EntityUid,
        action: EntityUid,
        resource: EntityUid,
        context: BTreeMap<String, Value>,
        entities: EntityStore,
    }

    impl Fixture {
        fn new() -> Self {
            let alice = EntityUid::new("User", "alice");
            let admins = EntityUid::new("Group", "admins");
            let staff = EntityUid::new("Group", "staff");
            let photo = EntityUid::new("Photo", "VacationPhoto94.jpg");

            let entities = EntityStore::load([
                Entity::new(alice.clone())
                    .with_attr("age", Value::Long(30))
                    .with_attr("name", "alice")
                    .with_attr("address", Value::record([("city", Value::from("Oslo"))]))
                    .with_parent(admins.clone()),
                Entity::new(admins).with_parent(staff.clone()),
                Entity::new(staff),
                Entity::new(photo.clone())
                    .with_attr("owner", alice.clone())
                    .with_attr("tags", Value::set([Value::from("beach"), Value::from("2024")])),
            ])
            .expect("load");

            let mut context = BTreeMap::new();
            context.insert("mfa".to_string(), Value::Bool(true));
            context.insert("risk".to_string(), Value::Long(3));

            Self {
                principal: alice,
                action: EntityUid::new("Action", "view"),
                resource: photo,
                context,
                entities,
            }
        }

        fn env(&self) -> Env<'_> {
            Env {
                principal: &self.principal,
                action: &self.action,
                resource: &self.resource,
                context: &self.context,
                entities: &self.entities,
            }
        }

        fn eval(&self, src: &str) -> Result<Value> {
            let expr = parse_expression(src).expect("parse");
            evaluate(&expr, &self.env())
        }
    }

    #[test_case("principal.age >= 18" => true; "attribute comparison")]
    #[test_case("principal in Group::\"staff\"" => true; "transitive in")]
    #[test_case("principal in principal" => true; "reflexive in")]
    #[test_case("principal in [Group::\"other\", Group::\"admins\"]" => true; "in set")]
    #[test_case("principal in Group::\"nobody\"" => false; "not an ancestor")]
    #[test_case("resource.owner == principal" => true; "entity equality")]
    #[test_case("context.mfa && context.risk < 5" => true; "context access")]
    #[test_case("principal has age" => true; "has present")]
    #[test_case("principal has email" => false; "has absent")]
    #[test_case("User::\"ghost\" has age" => false; "has on missing entity")]
    #[test_case("principal.address.city == \"Oslo\"" => true; "nested record")]
    #[test_case("principal[\"name\"] like \"a*e\"" => true; "like with wildcard")]
    #[test_case("resource.tags.contains(\"beach\")" => true; "set contains")]
    #[test_case("resource.tags.containsAll([\"beach\"])" => true; "contains all")]
    #[test_case("resource.tags.containsAny([\"snow\"])" => false; "contains any")]
    #[test_case("[].isEmpty()" => true; "is empty")]
    #[test_case("principal is User in Group::\"admins\"" => true; "is in")]
    #[test_case("principal is Photo" => false; "is other type")]
    #[test_case("if context.mfa then 1 + 2 * 3 == 7 else false" => true; "if then else")]
    #[test_case("-(2 - 5) > 2" => true; "negation")]
    #[test_case("{a: 1, b: [true]} == {b: [true], a: 1}" => true; "record equality")]
    #[test_case("1 == \"1\"" => false; "no coercion in equality")]
    fn test_evaluate_bool(src: &str) -> bool {
        let fixture = Fixture::new();
        match fixture.eval(src).expect("evaluate") {
            Value::Bool(b) => b,
            other => panic!("expected bool, got {other}"),
        }
    }

    #[test_case("1 && true" => EvalErrorKind::TypeMismatch; "non bool operand")]
    #[test_case("!\"x\"" => EvalErrorKind::TypeMismatch; "not on string")]
    #[test_case("\"a\" < \"b\"" => EvalErrorKind::TypeMismatch; "string comparison")]
    #[test_case("principal.email" => EvalErrorKind::AttributeNotFound; "missing attribute")]
    #[test_case("context.missing" => EvalErrorKind::AttributeNotFound; "missing context key")]
    #[test_case("User::\"ghost\".age" => EvalErrorKind::EntityNotFound; "missing entity")]
    #[test_case("\"s\".len" => EvalErrorKind::TypeMismatch; "attribute on string")]
    #[test_case("foo" => EvalErrorKind::UndeclaredName; "unknown name")]
    #[test_case("ip(\"1.2.3.4\")" => EvalErrorKind::UndeclaredName; "unknown function")]
    #[test_case("[1].size()" => EvalErrorKind::UndeclaredName; "unknown method")]
    #[test_case("[1].contains()" => EvalErrorKind::WrongArity; "wrong arity")]
    #[test_case("9223372036854775807 + 1" => EvalErrorKind::IntegerOverflow; "add overflow")]
    #[test_case("-(-9223372036854775808)" => EvalErrorKind::IntegerOverflow; "negate overflow")]
    #[test_case("principal in [1]" => EvalErrorKind::TypeMismatch; "in non entity set")]
    #[test_case("1 in Group::\"admins\"" => EvalErrorKind::TypeMismatch; "in on long")]
    #[test_case("if 1 then true else false" => EvalErrorKind::TypeMismatch; "if on long")]
    fn test_evaluate_errors(src: &str) -> EvalErrorKind {
        let fixture = Fixture::new();
        fixture.eval(src).expect_err("should fail").kind()
    }

    #[test]
    fn test_short_circuit_skips_errors() {
        let fixture = Fixture::new();
        assert_eq!(fixture.eval("false && foo"), Ok(Value::Bool(false)));
        assert_eq!(fixture.eval("true || principal.email"), Ok(Value::Bool(true)));
        assert_eq!(fixture.eval("if true then 1 else foo"), Ok(Value::Long(1)));
        assert_eq!(
            fixture.eval("principal is Photo in foo"),
            Ok(Value::Bool(false))
        );
    }

    #[test]
    fn test_right_operand_still_type_checked() {
        let fixture = Fixture::new();
        let err = fixture.eval("true && 1").unwrap_err();
        assert_eq!(
            err,
            EvalError::TypeMismatch {
                expected: "bool",
                actual: "long",
            }
        );
    }

    #[test]
    fn test_error_messages_are_descriptive() {
        let fixture = Fixture::new();
        let err = fixture.eval("principal.email").unwrap_err();
        assert_eq!(
            err.to_string(),
            "attribute `email` not found on User::\"alice\""
        );
    }

    #[test]
    fn test_wildcard_matches() {
        use PatternElem::{Char, Wildcard};
        let pat = |s: &str| -> Vec<PatternElem> {
            s.chars()
                .map(|c| if c == '*' { Wildcard } else { Char(c) })
                .collect()
        };

        assert!(wildcard_matches(&pat("*"), ""));
        assert!(wildcard_matches(&pat("*.jpg"), "photo.jpg"));
        assert!(wildcard_matches(&pat("a*b*c"), "aXXbYYc"));
        assert!(wildcard_matches(&pat("a*a"), "aaa"));
        assert!(!wildcard_matches(&pat("a*b"), "aXXc"));
        assert!(!wildcard_matches(&pat("abc"), "ab"));
        assert!(wildcard_matches(&[Char('*')], "*"));
        assert!(!wildcard_matches(&[Char('*')], "x"));
    }
}
