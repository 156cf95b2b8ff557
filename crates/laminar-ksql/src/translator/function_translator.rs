//! Expression and method-call translation.
//!
//! One translator serves every clause builder. Member references are
//! rendered through a caller-supplied [`MemberResolver`], which is how the
//! same call (`x.Name.ToUpper()`) becomes `UPPER(NAME)` in SELECT and
//! `UPPER(o.Name)` in a joined WHERE.

use tracing::debug;

use super::type_mapping::{check_argument_types, map_value_type};
use crate::catalog::{FunctionCatalog, FunctionMapping};
use crate::config::DecimalConfig;
use crate::error::TranslateError;
use crate::expr::{BinaryOp, Expr, Literal, MemberAccess, MethodCall, UnaryOp, ValueType};

const TIMESTAMP_FORMAT: &str = "'yyyy-MM-dd''T''HH:mm:ssXXX'";

/// Renders member accesses for one clause.
pub trait MemberResolver {
    /// Dialect text for `member`.
    ///
    /// # Errors
    ///
    /// Implementations fail when the member cannot be referenced in their
    /// clause (for example an access not rooted at a source parameter).
    fn resolve(&self, member: &MemberAccess) -> Result<String, TranslateError>;
}

/// Resolver that renders the bare member name.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainMemberNames;

impl MemberResolver for PlainMemberNames {
    fn resolve(&self, member: &MemberAccess) -> Result<String, TranslateError> {
        Ok(member.name.clone())
    }
}

/// Operator text used by the translator and the SELECT/WHERE builders.
#[must_use]
pub fn binary_operator(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Subtract => "-",
        BinaryOp::Multiply => "*",
        BinaryOp::Divide => "/",
        BinaryOp::Modulo => "%",
        BinaryOp::Equal => "=",
        BinaryOp::NotEqual => "!=",
        BinaryOp::GreaterThan => ">",
        BinaryOp::GreaterThanOrEqual => ">=",
        BinaryOp::LessThan => "<",
        BinaryOp::LessThanOrEqual => "<=",
        BinaryOp::AndAlso => "AND",
        BinaryOp::OrElse => "OR",
        BinaryOp::Coalesce => "??",
    }
}

/// Translates expression trees into dialect text.
#[derive(Debug, Clone, Copy)]
pub struct ExpressionTranslator<'a> {
    catalog: &'a FunctionCatalog,
    decimal: &'a DecimalConfig,
}

impl<'a> ExpressionTranslator<'a> {
    /// Creates a translator over `catalog`.
    #[must_use]
    pub fn new(catalog: &'a FunctionCatalog, decimal: &'a DecimalConfig) -> Self {
        Self { catalog, decimal }
    }

    /// Catalog in use.
    #[must_use]
    pub fn catalog(&self) -> &'a FunctionCatalog {
        self.catalog
    }

    /// Decimal settings in use.
    #[must_use]
    pub fn decimal(&self) -> &'a DecimalConfig {
        self.decimal
    }

    /// Translates any expression node.
    ///
    /// # Errors
    ///
    /// Propagates call translation failures and rejects record construction.
    pub fn translate(
        &self,
        expr: &Expr,
        members: &dyn MemberResolver,
    ) -> Result<String, TranslateError> {
        match expr {
            Expr::Call(call) => self.translate_call(call, members),
            Expr::Member(m) => members.resolve(m),
            Expr::Constant(lit) => Ok(lit.to_sql()),
            Expr::Parameter(p) => Ok(p.name.clone()),
            Expr::Lambda(l) => self.translate(&l.body, members),
            Expr::Unary { op, operand, .. } => {
                let inner = self.translate(operand, members)?;
                Ok(match op {
                    UnaryOp::Convert => inner,
                    UnaryOp::Not => format!("NOT ({inner})"),
                    UnaryOp::Negate => format!("-{inner}"),
                })
            }
            Expr::Binary { op, left, right } => {
                let l = self.translate(left, members)?;
                let r = self.translate(right, members)?;
                Ok(match op {
                    BinaryOp::Coalesce => format!("COALESCE({l}, {r})"),
                    _ => format!("({l} {} {r})", binary_operator(*op)),
                })
            }
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => {
                let t = self.translate(test, members)?;
                let a = self.translate(if_true, members)?;
                let b = self.translate(if_false, members)?;
                Ok(format!("CASE WHEN {t} THEN {a} ELSE {b} END"))
            }
            Expr::Record(_) => Err(TranslateError::InvalidExpression(
                "Record construction cannot be used as a scalar expression".to_string(),
            )),
        }
    }

    /// Translates one method call.
    ///
    /// # Errors
    ///
    /// - [`TranslateError::UnsupportedFunction`] for unmapped methods without
    ///   a `To*` cast fallback
    /// - [`TranslateError::ArgumentCount`] when the effective argument count
    ///   is outside the mapping's bounds
    /// - [`TranslateError::ArgumentType`] when an argument category is rejected
    pub fn translate_call(
        &self,
        call: &MethodCall,
        members: &dyn MemberResolver,
    ) -> Result<String, TranslateError> {
        let Some(mapping) = self.catalog.get(&call.name) else {
            return self.translate_unknown(call, members);
        };

        let count = call.effective_arg_count();
        if !mapping.accepts(count) {
            return Err(TranslateError::ArgumentCount {
                method: call.name.clone(),
                expected: mapping.arg_range(),
                actual: count,
            });
        }

        let arg_types: Vec<ValueType> = call.effective_args().iter().map(|a| a.value_type()).collect();
        check_argument_types(&mapping.function, &arg_types)?;

        if mapping.special {
            return self.translate_special(call, mapping, members);
        }
        let args = self.translate_args(call, members)?;
        mapping.render(&args)
    }

    fn translate_args(
        &self,
        call: &MethodCall,
        members: &dyn MemberResolver,
    ) -> Result<Vec<String>, TranslateError> {
        call.effective_args()
            .into_iter()
            .map(|a| self.translate(a, members))
            .collect()
    }

    fn translate_special(
        &self,
        call: &MethodCall,
        mapping: &FunctionMapping,
        members: &dyn MemberResolver,
    ) -> Result<String, TranslateError> {
        match call.name.as_str() {
            "ToString" => self.translate_to_string(call, members),
            "Parse" | "Convert" => {
                let target = map_value_type(&call.return_ty, self.decimal)?;
                let args = self.translate_args(call, members)?;
                let source = first_arg(&call.name, &args)?;
                Ok(format!("CAST({source} AS {target})"))
            }
            "Case" => {
                let args = self.translate_args(call, members)?;
                let mut out = String::from("CASE");
                for pair in args.chunks_exact(2) {
                    out.push_str(&format!(" WHEN {} THEN {}", pair[0], pair[1]));
                }
                if args.len() % 2 == 1 {
                    out.push_str(&format!(" ELSE {}", args[args.len() - 1]));
                }
                out.push_str(" END");
                Ok(out)
            }
            "Count" => {
                let effective = call.effective_args();
                match effective.first() {
                    None | Some(Expr::Lambda(_)) => Ok("COUNT(*)".to_string()),
                    Some(arg) => Ok(format!("COUNT({})", self.translate(arg, members)?)),
                }
            }
            _ => {
                let args = self.translate_args(call, members)?;
                mapping.render(&args)
            }
        }
    }

    fn translate_to_string(
        &self,
        call: &MethodCall,
        members: &dyn MemberResolver,
    ) -> Result<String, TranslateError> {
        let subject = call
            .receiver
            .as_deref()
            .or_else(|| call.effective_args().first().copied());
        let Some(subject) = subject else {
            return Err(TranslateError::InvalidExpression(
                "ToString requires a value to convert".to_string(),
            ));
        };

        let text = self.translate(subject, members)?;
        if subject.value_type().is_date_time() {
            return Ok(format!(
                "FORMAT_TIMESTAMP(CAST({text} AS TIMESTAMP), {TIMESTAMP_FORMAT}, 'UTC')"
            ));
        }
        Ok(format!("CAST({text} AS VARCHAR)"))
    }

    fn translate_unknown(
        &self,
        call: &MethodCall,
        members: &dyn MemberResolver,
    ) -> Result<String, TranslateError> {
        if call.name.starts_with("To") && call.effective_arg_count() <= 1 {
            let target = FunctionCatalog::infer_type(&call.name, self.decimal);
            let source = match call.effective_args().first() {
                Some(arg) => self.translate(arg, members)?,
                None => Literal::Null.to_sql(),
            };
            debug!(method = %call.name, target = %target, "unmapped conversion rendered as CAST");
            return Ok(format!("CAST({source} AS {target})"));
        }

        Err(TranslateError::UnsupportedFunction {
            name: call.name.clone(),
            hint: self.catalog.suggest(&call.name),
        })
    }
}

fn first_arg<'s>(method: &str, args: &'s [String]) -> Result<&'s str, TranslateError> {
    args.first().map(String::as_str).ok_or_else(|| TranslateError::ArgumentCount {
        method: method.to_string(),
        expected: crate::error::ArgRange { min: 1, max: Some(1) },
        actual: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Param;

    fn translator() -> ExpressionTranslator<'static> {
        static DECIMAL: std::sync::LazyLock<DecimalConfig> =
            std::sync::LazyLock::new(DecimalConfig::default);
        ExpressionTranslator::new(FunctionCatalog::builtin(), &DECIMAL)
    }

    fn trade() -> Param {
        Param::new("t", ValueType::Record("Trade".into()))
    }

    fn grouping() -> Param {
        Param::new(
            "g",
            ValueType::Grouping {
                key: Box::new(ValueType::String),
                element: Box::new(ValueType::Record("Trade".into())),
            },
        )
    }

    #[test]
    fn test_to_upper() {
        let call = MethodCall::instance(
            "ToUpper",
            trade().field("Symbol", ValueType::String),
            vec![],
            ValueType::String,
        );
        let sql = translator().translate_call(&call, &PlainMemberNames).unwrap();
        assert_eq!(sql, "UPPER(Symbol)");
    }

    #[test]
    fn test_zero_arg_count() {
        let call = MethodCall::extension("Count", vec![grouping().expr()], ValueType::Long);
        let sql = translator().translate_call(&call, &PlainMemberNames).unwrap();
        assert_eq!(sql, "COUNT(*)");
    }

    #[test]
    fn test_count_with_selector_lambda() {
        let x = trade();
        let selector = Expr::Lambda(crate::expr::Lambda::new(
            vec![x.clone()],
            x.field("Price", ValueType::Double),
        ));
        let call = MethodCall::extension("Count", vec![grouping().expr(), selector], ValueType::Long);
        let sql = translator().translate_call(&call, &PlainMemberNames).unwrap();
        assert_eq!(sql, "COUNT(*)");
    }

    #[test]
    fn test_datetime_to_string() {
        let call = MethodCall::instance(
            "ToString",
            trade().field("Timestamp", ValueType::DateTime),
            vec![],
            ValueType::String,
        );
        let sql = translator().translate_call(&call, &PlainMemberNames).unwrap();
        assert_eq!(
            sql,
            "FORMAT_TIMESTAMP(CAST(Timestamp AS TIMESTAMP), 'yyyy-MM-dd''T''HH:mm:ssXXX', 'UTC')"
        );
    }

    #[test]
    fn test_plain_to_string() {
        let call = MethodCall::instance(
            "ToString",
            trade().field("Quantity", ValueType::Int),
            vec![],
            ValueType::String,
        );
        let sql = translator().translate_call(&call, &PlainMemberNames).unwrap();
        assert_eq!(sql, "CAST(Quantity AS VARCHAR)");
    }

    #[test]
    fn test_parse_casts_to_return_type() {
        let call = MethodCall::static_call(
            "Int32",
            "Parse",
            vec![trade().field("Code", ValueType::String)],
            ValueType::Int,
        );
        let sql = translator().translate_call(&call, &PlainMemberNames).unwrap();
        assert_eq!(sql, "CAST(Code AS INTEGER)");
    }

    #[test]
    fn test_case_folds_pairs_and_else() {
        let t = trade();
        let call = MethodCall::static_call(
            "KsqlFunctions",
            "Case",
            vec![
                Expr::binary(BinaryOp::GreaterThan, t.field("Price", ValueType::Double), Expr::int(10)),
                Expr::string("HIGH"),
                Expr::string("LOW"),
            ],
            ValueType::String,
        );
        let sql = translator().translate_call(&call, &PlainMemberNames).unwrap();
        assert_eq!(sql, "CASE WHEN (Price > 10) THEN 'HIGH' ELSE 'LOW' END");
    }

    #[test]
    fn test_unknown_to_method_falls_back_to_cast() {
        let call = MethodCall::instance(
            "ToInt64",
            trade().field("Volume", ValueType::Int),
            vec![],
            ValueType::Long,
        );
        let sql = translator().translate_call(&call, &PlainMemberNames).unwrap();
        assert_eq!(sql, "CAST(Volume AS BIGINT)");
    }

    #[test]
    fn test_unknown_method_fails_with_hint() {
        let call = MethodCall::instance(
            "ToUpperX",
            trade().field("Symbol", ValueType::String),
            vec![Expr::int(1)],
            ValueType::String,
        );
        let err = translator().translate_call(&call, &PlainMemberNames).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Function 'ToUpperX' is not supported."));
        assert!(msg.contains("Did you mean 'ToUpper'?"));
    }

    #[test]
    fn test_argument_count_error() {
        let call = MethodCall::instance(
            "Substring",
            trade().field("Symbol", ValueType::String),
            vec![],
            ValueType::String,
        );
        let err = translator().translate_call(&call, &PlainMemberNames).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Method 'Substring' expects 2-3 arguments, but got 1"
        );
    }

    #[test]
    fn test_sum_on_string_is_rejected() {
        let x = trade();
        let selector = Expr::Lambda(crate::expr::Lambda::new(
            vec![x.clone()],
            x.field("Symbol", ValueType::String),
        ));
        let call = MethodCall::extension("Sum", vec![grouping().expr(), selector], ValueType::String);
        let err = translator().translate_call(&call, &PlainMemberNames).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Function 'SUM' does not support argument type String"
        );
    }

    #[test]
    fn test_binary_and_conditional() {
        let t = trade();
        let e = Expr::Conditional {
            test: Box::new(Expr::binary(
                BinaryOp::NotEqual,
                t.field("Side", ValueType::String),
                Expr::string("B"),
            )),
            if_true: Box::new(Expr::int(1)),
            if_false: Box::new(Expr::int(0)),
        };
        let sql = translator().translate(&e, &PlainMemberNames).unwrap();
        assert_eq!(sql, "CASE WHEN (Side != 'B') THEN 1 ELSE 0 END");
    }

    #[test]
    fn test_record_is_rejected() {
        let e = Expr::record(vec![("A", Expr::int(1))]);
        assert!(translator().translate(&e, &PlainMemberNames).is_err());
    }
}
