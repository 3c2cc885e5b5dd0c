use super::ast::{
    BinaryOp, ConditionalBlock, Expr, LogicalOp, MemberKey, ParsedTemplate, TemplatePart, UnaryOp,
};
use crate::error::ParseError;
use crate::util::{display_template, truncate_for_display};
use crate::value::Value;
use lazy_static::lazy_static;
use pest::error::{ErrorVariant, InputLocation, LineColLocation};
use pest::iterators::{Pair, Pairs};
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest::Parser;
use pest_derive::Parser;

lazy_static! {
    // precedence is defined lowest to highest
    static ref PRATT_PARSER: PrattParser<Rule> = PrattParser::new()
        .op(Op::infix(Rule::or, Assoc::Left))
        .op(Op::infix(Rule::and, Assoc::Left))
        .op(Op::infix(Rule::eq, Assoc::Left) | Op::infix(Rule::ne, Assoc::Left))
        .op(
            Op::infix(Rule::lt, Assoc::Left)
                | Op::infix(Rule::gt, Assoc::Left)
                | Op::infix(Rule::le, Assoc::Left)
                | Op::infix(Rule::ge, Assoc::Left)
                | Op::infix(Rule::contains, Assoc::Left)
        )
        .op(Op::infix(Rule::add, Assoc::Left) | Op::infix(Rule::sub, Assoc::Left))
        .op(
            Op::infix(Rule::mul, Assoc::Left)
                | Op::infix(Rule::div, Assoc::Left)
                | Op::infix(Rule::rem, Assoc::Left)
        )
        .op(Op::prefix(Rule::not) | Op::prefix(Rule::neg) | Op::prefix(Rule::typeof_op))
        .op(Op::postfix(Rule::member) | Op::postfix(Rule::index));
}

#[derive(Parser)]
#[grammar = "template/grammar.pest"]
struct TemplateParser;

type PestError = pest::error::Error<Rule>;

/// Number of characters of the offending input quoted in parse errors
const FRAGMENT_LENGTH: usize = 40;

/// Parse a template string into literal text, expressions and conditional blocks
#[tracing::instrument(level = "trace")]
pub fn parse_template(source: &str) -> Result<ParsedTemplate, ParseError> {
    let template = TemplateParser::parse(Rule::template, source)
        .map_err(|error| from_pest(source, error))?
        .next()
        .ok_or_else(|| error(source, "empty parse result".to_string()))?;

    let mut blocks = BlockFolder::default();

    for pair in template.into_inner() {
        match pair.as_rule() {
            Rule::text => blocks.push(TemplatePart::Literal(pair.as_str().to_string())),
            Rule::escaped => blocks.push(TemplatePart::Escaped(pair.as_str().to_string())),
            Rule::interpolation => {
                let part = parse_interpolation(pair).map_err(|e| from_pest(source, e))?;
                blocks.push(part);
            }
            Rule::if_open => {
                let span = pair.as_span();
                let condition = parse_if_condition(pair).map_err(|e| from_pest(source, e))?;
                blocks.open(condition, span.start(), span.as_str());
            }
            Rule::else_marker => blocks
                .otherwise()
                .map_err(|message| error(source, message))?,
            Rule::endif_marker => blocks
                .close(source, pair.as_span().end())
                .map_err(|message| error(source, message))?,
            Rule::EOI => {}
            rule => {
                return Err(error(source, format!("unexpected segment {rule:?}")));
            }
        }
    }

    let parts = blocks.finish().map_err(|message| error(source, message))?;

    Ok(ParsedTemplate {
        source: source.to_string(),
        parts,
    })
}

/// Parse a standalone expression (the content of a `${...}` block)
pub fn parse_expression(source: &str) -> Result<Expr, ParseError> {
    parse_template(&format!("${{{source}}}")).and_then(|template| {
        match template.parts.into_iter().next() {
            Some(TemplatePart::Expression { expr, .. }) => Ok(expr),
            _ => Err(error(source, "expected a single expression".to_string())),
        }
    })
}

fn error(source: &str, message: String) -> ParseError {
    ParseError {
        template: display_template(source),
        message,
        location: None,
    }
}

/// Condense a pest error into a single line naming the offending fragment
fn from_pest(source: &str, error: PestError) -> ParseError {
    let position = match error.location {
        InputLocation::Pos(position) => position,
        InputLocation::Span((start, _)) => start,
    };
    let (line, column) = match error.line_col {
        LineColLocation::Pos(line_col) => line_col,
        LineColLocation::Span(line_col, _) => line_col,
    };

    let message = match &error.variant {
        ErrorVariant::CustomError { message } => {
            format!("{message} at line {line}, column {column}")
        }
        ErrorVariant::ParsingError { .. } => {
            // point at the block the failure happened in, not just the failing character
            let lookbehind_end = (position + 2).min(source.len());
            let start = source
                .get(..lookbehind_end)
                .and_then(|head| head.rfind("${"))
                .unwrap_or(position);

            match source.get(start..).filter(|fragment| !fragment.is_empty()) {
                Some(fragment) => format!(
                    "Invalid block at line {line}, column {column}: {}",
                    truncate_for_display(fragment, FRAGMENT_LENGTH)
                ),
                None => format!("Unexpected end of template at line {line}, column {column}"),
            }
        }
    };

    ParseError {
        template: display_template(source),
        message,
        location: None,
    }
}

fn custom_error(message: &str, span: pest::Span<'_>) -> PestError {
    PestError::new_from_span(
        ErrorVariant::CustomError {
            message: message.to_string(),
        },
        span,
    )
}

fn next_pair<'a>(
    pairs: &mut Pairs<'a, Rule>,
    span: pest::Span<'a>,
) -> Result<Pair<'a, Rule>, PestError> {
    pairs
        .next()
        .ok_or_else(|| custom_error("missing expected pair in rule", span))
}

fn parse_interpolation(pair: Pair<'_, Rule>) -> Result<TemplatePart, PestError> {
    let span = pair.as_span();
    let raw = pair.as_str().to_string();
    let mut inner = pair.into_inner();

    let body = next_pair(&mut inner, span)?;
    let expression = next_pair(&mut body.into_inner(), span)?;
    let optional = inner.any(|pair| pair.as_rule() == Rule::optional_marker);

    Ok(TemplatePart::Expression {
        expr: parse_expr(expression)?,
        optional,
        raw,
    })
}

fn parse_if_condition(pair: Pair<'_, Rule>) -> Result<Expr, PestError> {
    let span = pair.as_span();
    let body = next_pair(&mut pair.into_inner(), span)?;

    let expression = body
        .into_inner()
        .find(|pair| pair.as_rule() == Rule::expression)
        .ok_or_else(|| custom_error("missing condition", span))?;

    parse_expr(expression)
}

fn parse_expr(pair: Pair<'_, Rule>) -> Result<Expr, PestError> {
    let span = pair.as_span();
    let mut inner = pair.into_inner();

    let operation = next_pair(&mut inner, span)?;
    let condition = parse_operation(operation.into_inner())?;

    match (inner.next(), inner.next()) {
        (Some(consequent), Some(alternate)) => Ok(Expr::Ternary {
            condition: Box::new(condition),
            consequent: Box::new(parse_expr(consequent)?),
            alternate: Box::new(parse_expr(alternate)?),
        }),
        _ => Ok(condition),
    }
}

fn parse_operation(pairs: Pairs<'_, Rule>) -> Result<Expr, PestError> {
    PRATT_PARSER
        .map_primary(parse_primary)
        .map_prefix(|op, operand| {
            let op = match op.as_rule() {
                Rule::not => UnaryOp::Not,
                Rule::neg => UnaryOp::Negate,
                Rule::typeof_op => UnaryOp::TypeOf,
                _ => return Err(custom_error("unknown prefix operator", op.as_span())),
            };
            Ok(Expr::Unary {
                op,
                operand: Box::new(operand?),
            })
        })
        .map_infix(|left, op, right| {
            let logical = match op.as_rule() {
                Rule::and => Some(LogicalOp::And),
                Rule::or => Some(LogicalOp::Or),
                _ => None,
            };
            if let Some(op) = logical {
                return Ok(Expr::Logical {
                    op,
                    left: Box::new(left?),
                    right: Box::new(right?),
                });
            }

            let op = match op.as_rule() {
                Rule::eq => BinaryOp::Equal,
                Rule::ne => BinaryOp::NotEqual,
                Rule::gt => BinaryOp::Greater,
                Rule::ge => BinaryOp::GreaterOrEqual,
                Rule::lt => BinaryOp::Less,
                Rule::le => BinaryOp::LessOrEqual,
                Rule::contains => BinaryOp::Contains,
                Rule::add => BinaryOp::Add,
                Rule::sub => BinaryOp::Subtract,
                Rule::mul => BinaryOp::Multiply,
                Rule::div => BinaryOp::Divide,
                Rule::rem => BinaryOp::Modulo,
                _ => return Err(custom_error("unknown infix operator", op.as_span())),
            };
            Ok(Expr::Binary {
                op,
                left: Box::new(left?),
                right: Box::new(right?),
            })
        })
        .map_postfix(|object, op| {
            let span = op.as_span();
            let key = match op.as_rule() {
                Rule::member => {
                    MemberKey::Name(next_pair(&mut op.into_inner(), span)?.as_str().to_string())
                }
                Rule::index => {
                    let index = next_pair(&mut op.into_inner(), span)?;
                    MemberKey::Computed(Box::new(parse_expr(index)?))
                }
                _ => return Err(custom_error("unknown postfix operator", span)),
            };
            Ok(Expr::Member {
                object: Box::new(object?),
                key,
            })
        })
        .parse(pairs)
}

fn parse_primary(pair: Pair<'_, Rule>) -> Result<Expr, PestError> {
    let span = pair.as_span();

    match pair.as_rule() {
        Rule::group | Rule::nested_template => parse_expr(next_pair(&mut pair.into_inner(), span)?),
        Rule::array => Ok(Expr::Array(
            pair.into_inner().map(parse_expr).collect::<Result<_, _>>()?,
        )),
        Rule::call => {
            let mut inner = pair.into_inner();
            let name = next_pair(&mut inner, span)?.as_str().to_string();
            let args = inner.map(parse_expr).collect::<Result<_, _>>()?;
            Ok(Expr::Call { name, args })
        }
        Rule::identifier => Ok(Expr::Identifier(pair.as_str().to_string())),
        Rule::string => {
            let content = next_pair(&mut pair.into_inner(), span)?;
            Ok(Expr::Literal(Value::String(unescape_string(content.as_str()))))
        }
        Rule::number => Ok(Expr::Literal(parse_number(pair.as_str(), span)?)),
        Rule::boolean => Ok(Expr::Literal(Value::Boolean(pair.as_str() == "true"))),
        Rule::null => Ok(Expr::Literal(Value::Null)),
        rule => Err(custom_error(&format!("unhandled rule {rule:?}"), span)),
    }
}

fn parse_number(text: &str, span: pest::Span<'_>) -> Result<Value, PestError> {
    let is_decimal = text.contains(|c| matches!(c, '.' | 'e' | 'E'));

    if !is_decimal {
        if let Ok(integer) = text.parse::<i64>() {
            return Ok(Value::Integer(integer));
        }
    }

    text.parse::<f64>()
        .map(Value::Decimal)
        .map_err(|_| custom_error("invalid number literal", span))
}

/// Resolve backslash escapes in string literals
///
/// Unknown escapes are kept as they are.
fn unescape_string(text: &str) -> String {
    let mut unescaped = String::with_capacity(text.len());
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }

        match chars.next() {
            Some('n') => unescaped.push('\n'),
            Some('r') => unescaped.push('\r'),
            Some('t') => unescaped.push('\t'),
            Some(c @ ('"' | '\'' | '\\' | '$')) => unescaped.push(c),
            Some(other) => {
                unescaped.push('\\');
                unescaped.push(other);
            }
            None => unescaped.push('\\'),
        }
    }

    unescaped
}

/// Nest flat `${if}`, `${else}` and `${endif}` markers into [ConditionalBlock]s
#[derive(Default)]
struct BlockFolder {
    parts: Vec<TemplatePart>,
    open: Vec<OpenBlock>,
}

struct OpenBlock {
    condition: Expr,
    start: usize,
    opening: String,
    then_branch: Vec<TemplatePart>,
    else_branch: Option<Vec<TemplatePart>>,
}

impl BlockFolder {
    fn push(&mut self, part: TemplatePart) {
        match self.open.last_mut() {
            Some(block) => match block.else_branch.as_mut() {
                Some(else_branch) => else_branch.push(part),
                None => block.then_branch.push(part),
            },
            None => self.parts.push(part),
        }
    }

    fn open(&mut self, condition: Expr, start: usize, opening: &str) {
        self.open.push(OpenBlock {
            condition,
            start,
            opening: opening.to_string(),
            then_branch: vec![],
            else_branch: None,
        });
    }

    fn otherwise(&mut self) -> Result<(), String> {
        let Some(block) = self.open.last_mut() else {
            return Err("Found ${else} block without a preceding ${if ...} block".to_string());
        };

        if block.else_branch.is_some() {
            return Err(format!(
                "Found multiple ${{else}} blocks for the same {} block",
                block.opening
            ));
        }

        block.else_branch = Some(vec![]);
        Ok(())
    }

    fn close(&mut self, source: &str, end: usize) -> Result<(), String> {
        let Some(block) = self.open.pop() else {
            return Err("Found ${endif} block without a preceding ${if ...} block".to_string());
        };

        let raw = source.get(block.start..end).unwrap_or_default().to_string();
        self.push(TemplatePart::Conditional(Box::new(ConditionalBlock {
            condition: block.condition,
            then_branch: block.then_branch,
            else_branch: block.else_branch,
            raw,
        })));
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<TemplatePart>, String> {
        match self.open.pop() {
            Some(block) => Err(format!(
                "Missing ${{endif}} after {} block",
                truncate_for_display(&block.opening, FRAGMENT_LENGTH)
            )),
            None => Ok(self.parts),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ident(name: &str) -> Expr {
        Expr::Identifier(name.to_string())
    }

    fn member(object: Expr, name: &str) -> Expr {
        Expr::Member {
            object: Box::new(object),
            key: MemberKey::Name(name.to_string()),
        }
    }

    fn expr(source: &str) -> Expr {
        parse_expression(source).unwrap()
    }

    #[test]
    fn plain_text_is_a_single_literal() {
        let template = parse_template("just some text").unwrap();
        assert_eq!(
            template.parts,
            vec![TemplatePart::Literal("just some text".to_string())]
        );
        assert!(template.single_expression().is_none());
    }

    #[test]
    fn single_expression() {
        let template = parse_template("${ var.name }").unwrap();
        assert_eq!(
            template.single_expression(),
            Some(&member(ident("var"), "name"))
        );
    }

    #[test]
    fn optional_suffix() {
        let template = parse_template("${a.b}?").unwrap();
        assert_eq!(
            template.parts,
            vec![TemplatePart::Expression {
                expr: member(ident("a"), "b"),
                optional: true,
                raw: "${a.b}?".to_string(),
            }]
        );
        assert!(template.single_expression().is_none());
    }

    #[test]
    fn escaped_blocks_are_kept_verbatim() {
        let template = parse_template("a $${b} c").unwrap();
        assert_eq!(
            template.parts,
            vec![
                TemplatePart::Literal("a ".to_string()),
                TemplatePart::Escaped("$${b}".to_string()),
                TemplatePart::Literal(" c".to_string()),
            ]
        );
    }

    #[test]
    fn literals() {
        assert_eq!(expr("123"), Expr::Literal(Value::Integer(123)));
        assert_eq!(expr("1.5"), Expr::Literal(Value::Decimal(1.5)));
        assert_eq!(expr("true"), Expr::Literal(Value::Boolean(true)));
        assert_eq!(expr("null"), Expr::Literal(Value::Null));
        assert_eq!(expr("'it\\'s'"), Expr::Literal(Value::from("it's")));
        assert_eq!(expr("\"a\\$b\""), Expr::Literal(Value::from("a$b")));
    }

    #[test]
    fn identifiers_may_contain_dashes() {
        assert_eq!(expr("my-var.some-key"), member(ident("my-var"), "some-key"));
    }

    #[test]
    fn brackets_accept_nested_templates() {
        let nested = Expr::Member {
            object: Box::new(ident("foo")),
            key: MemberKey::Computed(Box::new(ident("bar"))),
        };
        assert_eq!(expr("foo[${bar}]"), nested);
        assert_eq!(expr("foo[ ${ bar } ]"), nested);
        assert_eq!(expr("foo[bar]"), nested);
    }

    #[test]
    fn precedence() {
        assert_eq!(
            expr("a || b && c == 1 + 2 * 3"),
            Expr::Logical {
                op: LogicalOp::Or,
                left: Box::new(ident("a")),
                right: Box::new(Expr::Logical {
                    op: LogicalOp::And,
                    left: Box::new(ident("b")),
                    right: Box::new(Expr::Binary {
                        op: BinaryOp::Equal,
                        left: Box::new(ident("c")),
                        right: Box::new(Expr::Binary {
                            op: BinaryOp::Add,
                            left: Box::new(Expr::Literal(Value::Integer(1))),
                            right: Box::new(Expr::Binary {
                                op: BinaryOp::Multiply,
                                left: Box::new(Expr::Literal(Value::Integer(2))),
                                right: Box::new(Expr::Literal(Value::Integer(3))),
                            }),
                        }),
                    }),
                }),
            }
        );
    }

    #[test]
    fn prefix_binds_tighter_than_comparison() {
        assert_eq!(
            expr("typeof a == 'string'"),
            Expr::Binary {
                op: BinaryOp::Equal,
                left: Box::new(Expr::Unary {
                    op: UnaryOp::TypeOf,
                    operand: Box::new(ident("a")),
                }),
                right: Box::new(Expr::Literal(Value::from("string"))),
            }
        );
    }

    #[test]
    fn ternary_and_contains() {
        assert_eq!(
            expr("a contains 'x' ? 1 : 2"),
            Expr::Ternary {
                condition: Box::new(Expr::Binary {
                    op: BinaryOp::Contains,
                    left: Box::new(ident("a")),
                    right: Box::new(Expr::Literal(Value::from("x"))),
                }),
                consequent: Box::new(Expr::Literal(Value::Integer(1))),
                alternate: Box::new(Expr::Literal(Value::Integer(2))),
            }
        );
    }

    #[test]
    fn calls_arrays_and_brackets() {
        assert_eq!(
            expr("join(['a', b], ',')"),
            Expr::Call {
                name: "join".to_string(),
                args: vec![
                    Expr::Array(vec![Expr::Literal(Value::from("a")), ident("b")]),
                    Expr::Literal(Value::from(",")),
                ],
            }
        );
        assert_eq!(
            expr("a[b.c]"),
            Expr::Member {
                object: Box::new(ident("a")),
                key: MemberKey::Computed(Box::new(member(ident("b"), "c"))),
            }
        );
    }

    #[test]
    fn nested_conditionals() {
        let template = parse_template("${if a}A${if b}B${else}C${endif}${endif}!").unwrap();

        let [TemplatePart::Conditional(outer), TemplatePart::Literal(tail)] =
            template.parts.as_slice()
        else {
            panic!("unexpected parts {:?}", template.parts);
        };
        assert_eq!(tail, "!");
        assert_eq!(outer.condition, ident("a"));
        assert_eq!(outer.raw, "${if a}A${if b}B${else}C${endif}${endif}");
        assert_eq!(outer.else_branch, None);

        let [TemplatePart::Literal(a), TemplatePart::Conditional(inner)] =
            outer.then_branch.as_slice()
        else {
            panic!("unexpected branch {:?}", outer.then_branch);
        };
        assert_eq!(a, "A");
        assert_eq!(inner.then_branch, vec![TemplatePart::Literal("B".to_string())]);
        assert_eq!(
            inner.else_branch,
            Some(vec![TemplatePart::Literal("C".to_string())])
        );
    }

    #[test]
    fn if_prefix_is_not_a_keyword() {
        assert_eq!(expr("iffy"), ident("iffy"));
    }

    #[test]
    fn unbalanced_conditionals() {
        let err = parse_template("${if a}A").unwrap_err();
        assert_eq!(err.message, "Missing ${endif} after ${if a} block");

        let err = parse_template("A${endif}").unwrap_err();
        assert_eq!(
            err.message,
            "Found ${endif} block without a preceding ${if ...} block"
        );

        let err = parse_template("${if a}${else}${else}${endif}").unwrap_err();
        assert_eq!(
            err.message,
            "Found multiple ${else} blocks for the same ${if a} block"
        );
    }

    #[test]
    fn unterminated_block_names_the_fragment() {
        let err = parse_template("hello ${world").unwrap_err();
        assert_eq!(err.template, "hello ${world");
        assert!(err.message.contains("${world"), "{}", err.message);
    }

    #[test]
    fn long_templates_are_truncated() {
        let source = format!("{}${{", "x".repeat(500));
        let err = parse_template(&source).unwrap_err();
        assert!(err.template.ends_with("..."));
        assert!(err.template.chars().count() <= 203);
    }
}
