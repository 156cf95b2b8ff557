//! Typed query expression tree.
//!
//! The DSL that builds query models produces these nodes; the compiler only
//! reads them. The node set is closed so every consumer matches it
//! exhaustively.

use std::fmt;

/// Static type of an expression node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// 32-bit integer
    Int,
    /// 16-bit integer
    Short,
    /// 64-bit integer
    Long,
    /// 64-bit float
    Double,
    /// 32-bit float
    Float,
    /// Fixed-point decimal
    Decimal,
    /// UTF-8 text
    String,
    /// Single character
    Char,
    /// Boolean
    Bool,
    /// Date and time without offset
    DateTime,
    /// Date and time with offset
    DateTimeOffset,
    /// 128-bit identifier
    Guid,
    /// Raw bytes
    Bytes,
    /// Optional value
    Nullable(Box<ValueType>),
    /// Collection of values
    List(Box<ValueType>),
    /// Result of a GROUP BY: a key plus the grouped elements
    Grouping {
        /// Key type
        key: Box<ValueType>,
        /// Element type
        element: Box<ValueType>,
    },
    /// Named record (entity or DTO)
    Record(String),
    /// Not known at model-build time
    Unknown,
}

impl ValueType {
    /// Wraps `self` as nullable.
    #[must_use]
    pub fn nullable(self) -> Self {
        Self::Nullable(Box::new(self))
    }

    /// Type with any `Nullable` wrapper removed.
    #[must_use]
    pub fn underlying(&self) -> &ValueType {
        match self {
            Self::Nullable(inner) => inner.underlying(),
            other => other,
        }
    }

    /// True for `Nullable(_)`.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        matches!(self, Self::Nullable(_))
    }

    /// True for text types.
    #[must_use]
    pub fn is_string(&self) -> bool {
        matches!(self.underlying(), Self::String)
    }

    /// True for booleans, nullable or not.
    #[must_use]
    pub fn is_bool(&self) -> bool {
        matches!(self.underlying(), Self::Bool)
    }

    /// True for timestamp-like types.
    #[must_use]
    pub fn is_date_time(&self) -> bool {
        matches!(self.underlying(), Self::DateTime | Self::DateTimeOffset)
    }

    /// True for GROUP BY groupings.
    #[must_use]
    pub fn is_grouping(&self) -> bool {
        matches!(self, Self::Grouping { .. })
    }

    /// True for collections (a string is not a collection here).
    #[must_use]
    pub fn is_collection(&self) -> bool {
        matches!(self.underlying(), Self::List(_))
    }

    /// True for primitive scalar types.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        !matches!(
            self.underlying(),
            Self::List(_) | Self::Grouping { .. } | Self::Record(_) | Self::Unknown
        )
    }

    /// Host type name used in diagnostics.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Int => "Int32".into(),
            Self::Short => "Int16".into(),
            Self::Long => "Int64".into(),
            Self::Double => "Double".into(),
            Self::Float => "Single".into(),
            Self::Decimal => "Decimal".into(),
            Self::String => "String".into(),
            Self::Char => "Char".into(),
            Self::Bool => "Boolean".into(),
            Self::DateTime => "DateTime".into(),
            Self::DateTimeOffset => "DateTimeOffset".into(),
            Self::Guid => "Guid".into(),
            Self::Bytes => "Byte[]".into(),
            Self::Nullable(inner) => format!("Nullable<{}>", inner.name()),
            Self::List(inner) => format!("List<{}>", inner.name()),
            Self::Grouping { key, element } => {
                format!("Grouping<{}, {}>", key.name(), element.name())
            }
            Self::Record(name) => name.clone(),
            Self::Unknown => "Object".into(),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Constant value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// `null`
    Null,
    /// Boolean constant
    Bool(bool),
    /// Integral constant
    Int(i64),
    /// Floating constant
    Float(f64),
    /// Text constant
    String(String),
    /// Inline collection (used by `Contains` membership tests)
    List(Vec<Literal>),
}

impl Literal {
    /// Dialect text for this constant.
    ///
    /// Strings are single-quoted with embedded quotes doubled, booleans are
    /// lower-case, and lists are comma-joined without brackets.
    #[must_use]
    pub fn to_sql(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(v) => v.to_string(),
            Self::String(s) => format!("'{}'", s.replace('\'', "''")),
            Self::List(items) => items
                .iter()
                .map(Literal::to_sql)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Static type of the constant.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Null => ValueType::Unknown,
            Self::Bool(_) => ValueType::Bool,
            Self::Int(_) => ValueType::Long,
            Self::Float(_) => ValueType::Double,
            Self::String(_) => ValueType::String,
            Self::List(items) => ValueType::List(Box::new(
                items.first().map_or(ValueType::Unknown, Literal::value_type),
            )),
        }
    }
}

/// Lambda parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Parameter name as written in the lambda
    pub name: String,
    /// Parameter type
    pub ty: ValueType,
}

impl Param {
    /// Creates a parameter.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    /// Reference to this parameter as an expression.
    #[must_use]
    pub fn expr(&self) -> Expr {
        Expr::Parameter(self.clone())
    }

    /// `param.name` member access.
    #[must_use]
    pub fn field(&self, name: &str, ty: ValueType) -> Expr {
        self.expr().field(name, ty)
    }
}

/// Member access `target.name`.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberAccess {
    /// Expression the member is read from
    pub target: Box<Expr>,
    /// Member name, original casing
    pub name: String,
    /// Member type
    pub ty: ValueType,
    /// Member is declared as a key column on its entity
    pub is_key: bool,
}

impl MemberAccess {
    /// Parameter at the root of the member chain, if any.
    #[must_use]
    pub fn root_parameter(&self) -> Option<&Param> {
        let mut current: &Expr = &self.target;
        loop {
            match current {
                Expr::Member(m) => current = &m.target,
                Expr::Parameter(p) => return Some(p),
                _ => return None,
            }
        }
    }

    /// Member names from the root parameter down to this member.
    ///
    /// Returns `None` when the chain is not rooted at a parameter.
    #[must_use]
    pub fn path(&self) -> Option<Vec<&str>> {
        let mut names = vec![self.name.as_str()];
        let mut current: &Expr = &self.target;
        loop {
            match current {
                Expr::Member(m) => {
                    names.push(m.name.as_str());
                    current = &m.target;
                }
                Expr::Parameter(_) => {
                    names.reverse();
                    return Some(names);
                }
                _ => return None,
            }
        }
    }

    /// True when the member is read directly off a parameter.
    #[must_use]
    pub fn is_on_parameter(&self) -> bool {
        matches!(*self.target, Expr::Parameter(_))
    }
}

/// How a method is bound to its receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// `receiver.Method(args)`; the receiver counts as an argument
    Instance,
    /// `Type.Method(args)`
    Static,
    /// Extension method; `args[0]` is the receiver and is not counted
    Extension,
}

/// Method invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    /// Method name
    pub name: String,
    /// Binding kind
    pub kind: CallKind,
    /// Receiver for instance calls
    pub receiver: Option<Box<Expr>>,
    /// Arguments in order
    pub args: Vec<Expr>,
    /// Return type
    pub return_ty: ValueType,
    /// Declaring type name for static calls (`Convert`, `Int32`, ...)
    pub declaring_type: Option<String>,
}

impl MethodCall {
    /// Instance call `receiver.name(args)`.
    #[must_use]
    pub fn instance(name: &str, receiver: Expr, args: Vec<Expr>, return_ty: ValueType) -> Self {
        Self {
            name: name.to_string(),
            kind: CallKind::Instance,
            receiver: Some(Box::new(receiver)),
            args,
            return_ty,
            declaring_type: None,
        }
    }

    /// Extension call; `args[0]` is the extended value.
    #[must_use]
    pub fn extension(name: &str, args: Vec<Expr>, return_ty: ValueType) -> Self {
        Self {
            name: name.to_string(),
            kind: CallKind::Extension,
            receiver: None,
            args,
            return_ty,
            declaring_type: None,
        }
    }

    /// Static call `declaring.name(args)`.
    #[must_use]
    pub fn static_call(
        declaring: &str,
        name: &str,
        args: Vec<Expr>,
        return_ty: ValueType,
    ) -> Self {
        Self {
            name: name.to_string(),
            kind: CallKind::Static,
            receiver: None,
            args,
            return_ty,
            declaring_type: Some(declaring.to_string()),
        }
    }

    /// Argument count as seen by the function mapping.
    #[must_use]
    pub fn effective_arg_count(&self) -> usize {
        match self.kind {
            CallKind::Instance => self.args.len() + usize::from(self.receiver.is_some()),
            CallKind::Extension => self.args.len().saturating_sub(1),
            CallKind::Static => self.args.len(),
        }
    }

    /// Arguments as seen by the function mapping: receiver first for
    /// instance calls, extended value dropped for extension calls.
    #[must_use]
    pub fn effective_args(&self) -> Vec<&Expr> {
        match self.kind {
            CallKind::Instance => self
                .receiver
                .as_deref()
                .into_iter()
                .chain(self.args.iter())
                .collect(),
            CallKind::Extension => self.args.iter().skip(1).collect(),
            CallKind::Static => self.args.iter().collect(),
        }
    }
}

/// Lambda `(params) => body`.
#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    /// Parameters in order
    pub params: Vec<Param>,
    /// Body
    pub body: Box<Expr>,
}

impl Lambda {
    /// Creates a lambda.
    #[must_use]
    pub fn new(params: Vec<Param>, body: Expr) -> Self {
        Self {
            params,
            body: Box::new(body),
        }
    }

    /// True when any parameter is a grouping.
    #[must_use]
    pub fn has_grouping_param(&self) -> bool {
        self.params.iter().any(|p| p.ty.is_grouping())
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Logical negation
    Not,
    /// Arithmetic negation
    Negate,
    /// Implicit or explicit conversion; transparent in SQL
    Convert,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `%`
    Modulo,
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanOrEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqual,
    /// `&&`
    AndAlso,
    /// `||`
    OrElse,
    /// `??`
    Coalesce,
}

impl BinaryOp {
    /// True for `==`, `!=`, `<`, `<=`, `>`, `>=`.
    #[must_use]
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Equal
                | Self::NotEqual
                | Self::GreaterThan
                | Self::GreaterThanOrEqual
                | Self::LessThan
                | Self::LessThanOrEqual
        )
    }
}

/// Record construction (`new { A = .., B = .. }` or a named DTO).
#[derive(Debug, Clone, PartialEq)]
pub struct RecordExpr {
    /// DTO type name; `None` for anonymous records
    pub type_name: Option<String>,
    /// Members in declaration order
    pub members: Vec<(String, Expr)>,
}

impl RecordExpr {
    /// True for anonymous records.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.type_name.is_none()
    }
}

/// Expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Lambda parameter reference
    Parameter(Param),
    /// Member access
    Member(MemberAccess),
    /// Constant
    Constant(Literal),
    /// Method call
    Call(MethodCall),
    /// Nested lambda (aggregate selectors)
    Lambda(Lambda),
    /// Unary operation
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: Box<Expr>,
        /// Result type
        ty: ValueType,
    },
    /// Binary operation
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// `test ? if_true : if_false`
    Conditional {
        /// Condition
        test: Box<Expr>,
        /// Value when true
        if_true: Box<Expr>,
        /// Value when false
        if_false: Box<Expr>,
    },
    /// Record construction
    Record(RecordExpr),
}

impl Expr {
    /// `self.name` member access.
    #[must_use]
    pub fn field(self, name: &str, ty: ValueType) -> Expr {
        Expr::Member(MemberAccess {
            target: Box::new(self),
            name: name.to_string(),
            ty,
            is_key: false,
        })
    }

    /// Marks a member access as a declared key column. Other nodes are
    /// returned unchanged.
    #[must_use]
    pub fn as_key(self) -> Expr {
        match self {
            Expr::Member(mut m) => {
                m.is_key = true;
                Expr::Member(m)
            }
            other => other,
        }
    }

    /// Constant node.
    #[must_use]
    pub fn lit(value: Literal) -> Expr {
        Expr::Constant(value)
    }

    /// String constant.
    #[must_use]
    pub fn string(value: &str) -> Expr {
        Expr::Constant(Literal::String(value.to_string()))
    }

    /// Integer constant.
    #[must_use]
    pub fn int(value: i64) -> Expr {
        Expr::Constant(Literal::Int(value))
    }

    /// `null` constant.
    #[must_use]
    pub fn null() -> Expr {
        Expr::Constant(Literal::Null)
    }

    /// Binary node.
    #[must_use]
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `left == right`
    #[must_use]
    pub fn eq(left: Expr, right: Expr) -> Expr {
        Self::binary(BinaryOp::Equal, left, right)
    }

    /// `left && right`
    #[must_use]
    pub fn and(left: Expr, right: Expr) -> Expr {
        Self::binary(BinaryOp::AndAlso, left, right)
    }

    /// `!operand`
    #[must_use]
    pub fn not(operand: Expr) -> Expr {
        Expr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(operand),
            ty: ValueType::Bool,
        }
    }

    /// Conversion wrapper.
    #[must_use]
    pub fn convert(operand: Expr, ty: ValueType) -> Expr {
        Expr::Unary {
            op: UnaryOp::Convert,
            operand: Box::new(operand),
            ty,
        }
    }

    /// Call node.
    #[must_use]
    pub fn call(call: MethodCall) -> Expr {
        Expr::Call(call)
    }

    /// Anonymous record.
    #[must_use]
    pub fn record(members: Vec<(&str, Expr)>) -> Expr {
        Expr::Record(RecordExpr {
            type_name: None,
            members: members
                .into_iter()
                .map(|(name, e)| (name.to_string(), e))
                .collect(),
        })
    }

    /// Named record (DTO construction).
    #[must_use]
    pub fn named_record(type_name: &str, members: Vec<(&str, Expr)>) -> Expr {
        Expr::Record(RecordExpr {
            type_name: Some(type_name.to_string()),
            members: members
                .into_iter()
                .map(|(name, e)| (name.to_string(), e))
                .collect(),
        })
    }

    /// Static type of this node.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Expr::Parameter(p) => p.ty.clone(),
            Expr::Member(m) => m.ty.clone(),
            Expr::Constant(lit) => lit.value_type(),
            Expr::Call(c) => c.return_ty.clone(),
            Expr::Lambda(l) => l.body.value_type(),
            Expr::Unary { ty, .. } => ty.clone(),
            Expr::Binary { op, left, .. } => {
                if op.is_comparison() || matches!(op, BinaryOp::AndAlso | BinaryOp::OrElse) {
                    ValueType::Bool
                } else {
                    left.value_type()
                }
            }
            Expr::Conditional { if_true, .. } => if_true.value_type(),
            Expr::Record(r) => {
                ValueType::Record(r.type_name.clone().unwrap_or_else(|| "<anonymous>".into()))
            }
        }
    }

    /// Strips `Convert` wrappers.
    #[must_use]
    pub fn unwrap_convert(&self) -> &Expr {
        match self {
            Expr::Unary {
                op: UnaryOp::Convert,
                operand,
                ..
            } => operand.unwrap_convert(),
            other => other,
        }
    }

    /// True for `null` constants.
    #[must_use]
    pub fn is_null_constant(&self) -> bool {
        matches!(self.unwrap_convert(), Expr::Constant(Literal::Null))
    }

    /// Visits this node and all descendants, parents first.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Parameter(_) | Expr::Constant(_) => {}
            Expr::Member(m) => m.target.walk(visit),
            Expr::Call(c) => {
                if let Some(r) = &c.receiver {
                    r.walk(visit);
                }
                for a in &c.args {
                    a.walk(visit);
                }
            }
            Expr::Lambda(l) => l.body.walk(visit),
            Expr::Unary { operand, .. } => operand.walk(visit),
            Expr::Binary { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => {
                test.walk(visit);
                if_true.walk(visit);
                if_false.walk(visit);
            }
            Expr::Record(r) => {
                for (_, e) in &r.members {
                    e.walk(visit);
                }
            }
        }
    }

    /// True when any node satisfies `pred`.
    #[must_use]
    pub fn any(&self, pred: &dyn Fn(&Expr) -> bool) -> bool {
        let mut found = false;
        self.walk(&mut |e| {
            if !found && pred(e) {
                found = true;
            }
        });
        found
    }
}

/// Upper-cases an identifier after replacing characters that are not
/// valid in an unquoted dialect identifier with `_`.
#[must_use]
pub fn sanitize_upper(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
