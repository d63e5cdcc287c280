use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, multispace0},
    combinator::{map, recognize, value},
    multi::many0,
    sequence::{pair, preceded},
};
use crate::analysis::analyzer::Analyzer;
use crate::core::error::{Error, Result};
use crate::core::types::DEFAULT_FIELD;
use crate::query::ast::{OperatorKind, QueryNode};
use crate::scoring::model::RetrievalModel;

/// Parser for the structured query language.
///
/// Examples:
/// - `apple pie` -> default operator over two terms
/// - `#AND( apple #NEAR/2( new.title york.title ) )`
/// - `#WAND( 0.7 apple 0.3 #SYN( pie tart ) )`
///
/// Every query is wrapped in the default operator of the retrieval model.
pub struct QueryParser {
    pub default_operator: OperatorKind,
    pub default_field: String,
    analyzer: Analyzer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lexeme<'a> {
    Open,
    Close,
    Operator(&'a str),
    Word(&'a str),
}

/// What the next token of a frame must be. Only weighted operators ever expect a weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Weight,
    Operand,
}

/// Operator still collecting its arguments
struct Frame {
    node: QueryNode,
    expect: Expect,
}

impl Frame {
    fn new(kind: OperatorKind) -> Self {
        Frame {
            node: QueryNode::empty(kind),
            expect: if kind.is_weighted() { Expect::Weight } else { Expect::Operand },
        }
    }

    fn is_weighted(&self) -> bool {
        self.node.kind().is_some_and(|kind| kind.is_weighted())
    }

    fn push_weight(&mut self, weight: f64) -> Result<()> {
        self.node.add_weight(weight)?;
        self.expect = Expect::Operand;
        Ok(())
    }

    fn push_operand(&mut self, operand: QueryNode) -> Result<()> {
        self.node.add(operand)?;
        if self.is_weighted() {
            self.expect = Expect::Weight;
        }
        Ok(())
    }

    /// The operand for the pending weight vanished (stop word or empty operator).
    fn drop_operand(&mut self) {
        self.node.discard_pending_weight();
        if self.is_weighted() {
            self.expect = Expect::Weight;
        }
    }
}

impl QueryParser {
    pub fn new(default_operator: OperatorKind, analyzer: Analyzer) -> Self {
        log::debug!("Query parser: default operator {}, analyzer {} ({})", default_operator, analyzer.name, analyzer.describe());
        QueryParser {
            default_operator,
            default_field: DEFAULT_FIELD.to_string(),
            analyzer,
        }
    }

    /// Parser using the model's default operator and the English analyzer.
    pub fn for_model(model: &RetrievalModel) -> Self {
        QueryParser::new(model.default_operator(), Analyzer::standard_english())
    }

    pub fn parse(&self, input: &str) -> Result<QueryNode> {
        let lexemes = tokenize(input)?;
        let mut stack = vec![Frame::new(self.default_operator)];
        let mut lexemes = lexemes.into_iter();

        while let Some(lexeme) = lexemes.next() {
            match lexeme {
                Lexeme::Operator(text) => {
                    let kind = parse_operator(text)?;
                    expect_operand(&stack, text)?;
                    if lexemes.next() != Some(Lexeme::Open) {
                        return Err(Error::parse(format!("{} must be followed by '('", text)));
                    }
                    stack.push(Frame::new(kind));
                }
                Lexeme::Open => {
                    return Err(Error::parse(format!("Unexpected '(' in query '{}'", input)));
                }
                Lexeme::Close => {
                    if stack.len() == 1 {
                        return Err(Error::parse(format!("Unbalanced ')' in query '{}'", input)));
                    }
                    let operator = close(stack.pop())?;
                    let parent = top(&mut stack)?;
                    if operator.children().is_empty() {
                        parent.drop_operand();
                    } else {
                        parent.push_operand(operator)?;
                    }
                }
                Lexeme::Word(text) => {
                    let frame = top(&mut stack)?;
                    if frame.expect == Expect::Weight {
                        let weight = text.parse::<f64>().map_err(|_| {
                            Error::parse(format!("Expected a weight in {}, found '{}'", frame.node, text))
                        })?;
                        frame.push_weight(weight)?;
                        continue;
                    }
                    match self.term(text) {
                        Some(term) => frame.push_operand(term)?,
                        None => frame.drop_operand(),
                    }
                }
            }
        }

        if stack.len() > 1 {
            return Err(Error::parse(format!("Missing ')' in query '{}'", input)));
        }
        let root = close(stack.pop())?;
        log::debug!("Parsed '{}' as {}", input, root);
        Ok(root)
    }

    /// Term node of `word` or `word.field`, or `None` when analysis leaves no stem.
    /// Only the first stem of a multi-token word is kept.
    fn term(&self, text: &str) -> Option<QueryNode> {
        let (word, field) = match text.rsplit_once('.') {
            Some((word, field)) if !word.is_empty() && !field.is_empty() => (word, field),
            _ => (text, self.default_field.as_str()),
        };
        self.analyzer.analyze_query(word)
            .into_iter()
            .next()
            .map(|stem| QueryNode::term(stem, field))
    }
}

fn top(stack: &mut [Frame]) -> Result<&mut Frame> {
    stack.last_mut()
        .ok_or_else(|| Error::parse("Query has no enclosing operator"))
}

fn expect_operand(stack: &[Frame], found: &str) -> Result<()> {
    match stack.last() {
        Some(frame) if frame.expect == Expect::Weight => Err(Error::parse(format!(
            "Expected a weight in {}, found '{}'", frame.node, found
        ))),
        _ => Ok(()),
    }
}

/// Finish a frame; a weighted operator must not end on a weight.
fn close(frame: Option<Frame>) -> Result<QueryNode> {
    let frame = frame.ok_or_else(|| Error::parse("Unbalanced ')'"))?;
    if frame.is_weighted() && frame.expect == Expect::Operand {
        return Err(Error::parse(format!("Weight without an operand in {}", frame.node)));
    }
    Ok(frame.node)
}

fn parse_operator(text: &str) -> Result<OperatorKind> {
    let lower = text.to_ascii_lowercase();
    let (name, argument) = match lower.split_once('/') {
        Some((name, argument)) => (name, Some(argument)),
        None => (lower.as_str(), None),
    };

    let kind = match (name, argument) {
        ("#and", None) => OperatorKind::And,
        ("#or", None) => OperatorKind::Or,
        ("#syn", None) => OperatorKind::Syn,
        ("#sum", None) => OperatorKind::Sum,
        ("#wand", None) => OperatorKind::WeightedAnd,
        ("#wsum", None) => OperatorKind::WeightedSum,
        ("#near", Some(argument)) => OperatorKind::Near(parse_distance(text, argument)?),
        ("#window", Some(argument)) => OperatorKind::Window(parse_distance(text, argument)?),
        ("#near" | "#window", None) => {
            return Err(Error::parse(format!("{} needs a distance, e.g. {}/3", text, text)));
        }
        _ => return Err(Error::parse(format!("Unknown operator '{}'", text))),
    };
    Ok(kind)
}

fn parse_distance(operator: &str, argument: &str) -> Result<u32> {
    match argument.parse::<u32>() {
        Ok(distance) if distance > 0 => Ok(distance),
        _ => Err(Error::parse(format!("Invalid distance in '{}'", operator))),
    }
}

fn is_operator_char(c: char) -> bool {
    c.is_alphanumeric() || c == '/'
}

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && c != '(' && c != ')'
}

fn lexeme(input: &str) -> IResult<&str, Lexeme<'_>> {
    preceded(
        multispace0,
        alt((
            value(Lexeme::Open, char('(')),
            value(Lexeme::Close, char(')')),
            map(recognize(pair(char('#'), take_while(is_operator_char))), Lexeme::Operator),
            map(take_while1(is_word_char), Lexeme::Word),
        )),
    ).parse(input)
}

fn tokenize(input: &str) -> Result<Vec<Lexeme<'_>>> {
    let (rest, lexemes) = many0(lexeme)
        .parse(input)
        .map_err(|e| Error::parse(format!("Cannot tokenize query '{}': {}", input, e)))?;
    if !rest.trim().is_empty() {
        return Err(Error::parse(format!("Unexpected input '{}' in query '{}'", rest.trim(), input)));
    }
    Ok(lexemes)
}
