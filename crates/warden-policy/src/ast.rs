//! Policy and expression syntax trees.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use warden_types::{EntityType, EntityUid, Value};

// ============================================================================
// Policy Id
// ============================================================================

/// Identifier of a policy within a loaded policy set.
///
/// Policies receive `policy<N>` from their 0-based source position.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyId(String);

impl PolicyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the generated id for the policy at `index` in source order.
    pub fn from_index(index: usize) -> Self {
        Self(format!("policy{index}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Effect
// ============================================================================

/// The effect of a satisfied policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Effect {
    /// Grant access unless a satisfied `Forbid` exists.
    Permit,
    /// Deny access, overriding every `Permit`.
    Forbid,
}

impl Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Permit => f.write_str("permit"),
            Effect::Forbid => f.write_str("forbid"),
        }
    }
}

// ============================================================================
// Scope
// ============================================================================

/// A single scope clause for the principal, action, or resource slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeConstraint {
    /// Bare slot name: matches every request.
    Any,
    /// `slot == UID`
    Eq(EntityUid),
    /// `slot in UID`: the request entity is `UID` or a descendant of it.
    In(EntityUid),
    /// `action in [UID, ...]`: a descendant of any listed entity.
    InAny(Vec<EntityUid>),
    /// `slot is Type`
    Is(EntityType),
    /// `slot is Type in UID`
    IsIn(EntityType, EntityUid),
}

/// The three scope clauses of a policy, in fixed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub principal: ScopeConstraint,
    pub action: ScopeConstraint,
    pub resource: ScopeConstraint,
}

impl Scope {
    /// Scope that matches every request.
    pub fn any() -> Self {
        Self {
            principal: ScopeConstraint::Any,
            action: ScopeConstraint::Any,
            resource: ScopeConstraint::Any,
        }
    }
}

// ============================================================================
// Conditions
// ============================================================================

/// Whether a condition clause must hold (`when`) or must not hold (`unless`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionKind {
    When,
    Unless,
}

/// One `when { ... }` or `unless { ... }` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub kind: ConditionKind,
    pub body: Expr,
}

// ============================================================================
// Expressions
// ============================================================================

/// Request variables available in conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Var {
    Principal,
    Action,
    Resource,
    Context,
}

impl Var {
    pub(crate) fn from_keyword(name: &str) -> Option<Self> {
        match name {
            "principal" => Some(Var::Principal),
            "action" => Some(Var::Action),
            "resource" => Some(Var::Resource),
            "context" => Some(Var::Context),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Add,
    Sub,
    Mul,
}

impl BinaryOp {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::In => "in",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
        }
    }
}

/// One element of a compiled `like` pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternElem {
    Char(char),
    Wildcard,
}

/// A condition expression tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Boolean, long, string, or entity literal.
    Literal(Value),
    Var(Var),
    /// Any other bare identifier. Evaluates to `UndeclaredName`.
    Name(String),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    /// Short-circuiting `&&`.
    And(Box<Expr>, Box<Expr>),
    /// Short-circuiting `||`.
    Or(Box<Expr>, Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    If {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    /// `e.attr` or `e["attr"]`
    GetAttr { expr: Box<Expr>, attr: String },
    /// `e has attr`
    HasAttr { expr: Box<Expr>, attr: String },
    /// `e like "pat*tern"`
    Like {
        expr: Box<Expr>,
        pattern: Vec<PatternElem>,
    },
    /// `e is Type` or `e is Type in other`
    Is {
        expr: Box<Expr>,
        entity_type: EntityType,
        in_expr: Option<Box<Expr>>,
    },
    Set(Vec<Expr>),
    Record(Vec<(String, Expr)>),
    /// `receiver.method(args)`
    MethodCall {
        receiver: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    /// `name(args)`; no functions are registered, so this is `UndeclaredName`.
    Call { name: String, args: Vec<Expr> },
}

// ============================================================================
// Annotations
// ============================================================================

/// Ordered `@key("value")` annotations. Re-declaring a key overwrites its
/// value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotations(Vec<(String, String)>);

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites an annotation, keeping the first declaration's position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterates `(key, value)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ============================================================================
// Policy
// ============================================================================

/// Annotation key that carries a policy's explicit name.
pub const ID_ANNOTATION: &str = "id";

/// A parsed policy statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    id: PolicyId,
    effect: Effect,
    scope: Scope,
    conditions: Vec<Condition>,
    annotations: Annotations,
}

impl Policy {
    pub fn new(
        id: PolicyId,
        effect: Effect,
        scope: Scope,
        conditions: Vec<Condition>,
        annotations: Annotations,
    ) -> Self {
        Self {
            id,
            effect,
            scope,
            conditions,
            annotations,
        }
    }

    pub fn id(&self) -> &PolicyId {
        &self.id
    }

    pub fn effect(&self) -> Effect {
        self.effect
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Condition clauses in source order. Empty means "always true".
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// All declared annotations, including `@id`.
    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    /// The explicit name given by `@id("...")`, if any.
    pub fn name(&self) -> Option<&str> {
        self.annotations.get(ID_ANNOTATION)
    }

    /// Annotations reported in responses: everything except `@id`.
    pub fn reported_annotations(&self) -> impl Iterator<Item = (&str, &str)> {
        self.annotations
            .iter()
            .filter(|(key, _)| *key != ID_ANNOTATION)
    }
}
