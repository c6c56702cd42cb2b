//! Deterministic keyword resolver.
//!
//! Rules are tried in a fixed order and the first one that fires produces the
//! SQL. A rule that fires but cannot find its target column in the live
//! schema emits the catch-all listing instead of guessing a column name.

use regex::Regex;
use std::sync::LazyLock;

use crate::ingest::schema::{ColumnSchema, TableSchema};
use crate::util::sql::{quote_ident, quote_literal};

const ROW_LIMIT: usize = 50;
const LISTING_LIMIT: usize = 100;
const RANKING_LIMIT: usize = 10;

/// Category values that imply an equality filter on a known column.
const CATEGORY_TOKENS: &[(&str, &str)] = &[
    ("setosa", "species"),
    ("versicolor", "species"),
    ("virginica", "species"),
];

/// Columns holding 0/1 flags.
const FLAG_COLUMNS: &[&str] = &["survived"];

struct Measure {
    keyword: &'static str,
    compare_column: &'static str,
    compare_threshold: &'static str,
    max_column: &'static str,
    min_column: &'static str,
}

/// Measurement keywords and the columns they stand for when the text does
/// not say `length` or `width`.
const MEASURES: &[Measure] = &[
    Measure {
        keyword: "petal",
        compare_column: "petal_width",
        compare_threshold: "1",
        max_column: "petal_length",
        min_column: "petal_width",
    },
    Measure {
        keyword: "sepal",
        compare_column: "sepal_length",
        compare_threshold: "5",
        max_column: "sepal_length",
        min_column: "sepal_length",
    },
];

/// Ordering columns for top-10 lists when nothing more specific is named.
const RANK_BY_MAX: &str = "petal_length";
const RANK_BY_MIN: &str = "petal_width";

const COUNT_WORDS: &[&str] = &["count", "counts"];
const MAX_WORDS: &[&str] = &["max", "maximum", "largest"];
const MIN_WORDS: &[&str] = &["min", "minimum", "smallest"];

static COMPARISON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:(\w+)\s*)?(>=|<=|>|<)\s*(-?\d+(?:\.\d+)?)").expect("valid comparison regex")
});

static FLAG_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:=|\bis)\s*'?([01])(?:[^0-9.]|$)").expect("valid flag regex"));

static EQUALITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(\w+)\s*=\s*["']?(\w+)["']?"#).expect("valid equality regex"));

type Rule = fn(&Context) -> Option<String>;

/// Cascade order. The first rule returning `Some` wins.
const RULES: &[Rule] = &[
    count_rule,
    category_rule,
    comparison_rule,
    flag_rule,
    equality_rule,
    maximum_rule,
    minimum_rule,
];

/// Maps free text to one SQL statement over `schema`'s table. Total: always
/// returns a non-empty statement.
pub fn resolve(query_text: &str, schema: &TableSchema) -> String {
    let ctx = Context::new(query_text, &schema.name, &schema.columns);
    RULES
        .iter()
        .find_map(|rule| rule(&ctx))
        .unwrap_or_else(|| ctx.listing())
}

struct Context<'a> {
    original: &'a str,
    text: String,
    tokens: Vec<String>,
    table: &'a str,
    columns: &'a [ColumnSchema],
}

impl<'a> Context<'a> {
    fn new(query_text: &'a str, table: &'a str, columns: &'a [ColumnSchema]) -> Self {
        let text = query_text.to_lowercase();
        let tokens = text
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            original: query_text,
            text,
            tokens,
            table,
            columns,
        }
    }

    fn has_word(&self, words: &[&str]) -> bool {
        self.tokens.iter().any(|t| words.contains(&t.as_str()))
    }

    /// Whether the text names `column`, as a whole word or with spaces for
    /// underscores.
    fn mentions(&self, column: &str) -> bool {
        let name = column.to_lowercase();
        if name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            if self.tokens.iter().any(|t| *t == name) {
                return true;
            }
            name.contains('_') && self.text.contains(&name.replace('_', " "))
        } else {
            self.text.contains(&name)
        }
    }

    /// The schema's spelling of `candidate`, ready to interpolate.
    fn column(&self, candidate: &str) -> Option<String> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(candidate))
            .map(|c| quote_ident(&c.name).into_owned())
    }

    /// First schema column the text names.
    fn mentioned_column(&self) -> Option<String> {
        self.columns
            .iter()
            .find(|c| self.mentions(&c.name))
            .map(|c| quote_ident(&c.name).into_owned())
    }

    /// First text or boolean column the text names.
    fn mentioned_category(&self) -> Option<String> {
        self.columns
            .iter()
            .filter(|c| c.data_type.is_categorical())
            .find(|c| self.mentions(&c.name))
            .map(|c| quote_ident(&c.name).into_owned())
    }

    fn measure(&self) -> Option<&'static Measure> {
        MEASURES.iter().find(|m| self.text.contains(m.keyword))
    }

    /// `<keyword>_length` / `<keyword>_width` when the text says so,
    /// otherwise `default`.
    fn qualified(&self, measure: &Measure, default: &'static str) -> String {
        if self.text.contains("length") {
            format!("{}_length", measure.keyword)
        } else if self.text.contains("width") {
            format!("{}_width", measure.keyword)
        } else {
            default.to_string()
        }
    }

    fn listing(&self) -> String {
        format!("SELECT * FROM {} LIMIT {}", self.table, LISTING_LIMIT)
    }

    fn filter(&self, condition: &str) -> String {
        format!("SELECT * FROM {} WHERE {} LIMIT {}", self.table, condition, ROW_LIMIT)
    }

    fn group_count(&self, column: &str) -> String {
        format!(
            "SELECT {col}, COUNT(*) as count FROM {} GROUP BY {col}",
            self.table,
            col = column
        )
    }
}

fn count_rule(ctx: &Context) -> Option<String> {
    if !(ctx.has_word(COUNT_WORDS) || ctx.text.contains("how many")) {
        return None;
    }

    // Grouping by a numeric column would return one row per distinct value
    Some(match ctx.mentioned_category() {
        Some(column) => ctx.group_count(&column),
        None => format!("SELECT COUNT(*) as count FROM {}", ctx.table),
    })
}

fn category_rule(ctx: &Context) -> Option<String> {
    let (token, column) = CATEGORY_TOKENS
        .iter()
        .find(|(token, _)| ctx.has_word(&[token]))?;

    Some(match ctx.column(column) {
        Some(column) => ctx.filter(&format!("{} = {}", column, quote_literal(token))),
        None => ctx.listing(),
    })
}

fn comparison_rule(ctx: &Context) -> Option<String> {
    if !(ctx.text.contains('>') || ctx.text.contains('<')) {
        return None;
    }

    let captures = COMPARISON.captures(&ctx.text);
    let operator = match &captures {
        Some(caps) => caps[2].to_string(),
        None => ["<=", ">=", ">", "<"]
            .into_iter()
            .find(|op| ctx.text.contains(op))
            .unwrap_or(">")
            .to_string(),
    };
    let number = captures.as_ref().map(|caps| caps[3].to_string());

    if let Some(measure) = ctx.measure() {
        let target = ctx.qualified(measure, measure.compare_column);
        let threshold = number.unwrap_or_else(|| measure.compare_threshold.to_string());
        return Some(match ctx.column(&target) {
            Some(column) => ctx.filter(&format!("{} {} {}", column, operator, threshold)),
            None => ctx.listing(),
        });
    }

    // Without a vocabulary keyword the rule needs both a column and a number
    let number = number?;
    let column = captures
        .as_ref()
        .and_then(|caps| caps.get(1))
        .and_then(|lhs| ctx.column(lhs.as_str()))
        .or_else(|| ctx.mentioned_column())?;

    Some(ctx.filter(&format!("{} {} {}", column, operator, number)))
}

fn flag_rule(ctx: &Context) -> Option<String> {
    let flag = FLAG_COLUMNS.iter().find(|flag| ctx.mentions(flag))?;

    let Some(column) = ctx.column(flag) else {
        return Some(ctx.listing());
    };

    Some(match FLAG_LITERAL.captures(&ctx.text) {
        Some(caps) => ctx.filter(&format!("{} = {}", column, &caps[1])),
        None => ctx.group_count(&column),
    })
}

fn equality_rule(ctx: &Context) -> Option<String> {
    if !ctx.text.contains('=') {
        return None;
    }

    // Matched against the original text so string values keep their case
    let Some(caps) = EQUALITY.captures(ctx.original) else {
        return Some(ctx.listing());
    };

    let Some(column) = ctx.column(&caps[1]) else {
        return Some(ctx.listing());
    };

    let value = &caps[2];
    Some(if value.chars().all(|c| c.is_ascii_digit()) {
        ctx.filter(&format!("{} = {}", column, value))
    } else {
        ctx.filter(&format!("{} = {}", column, quote_literal(value)))
    })
}

fn maximum_rule(ctx: &Context) -> Option<String> {
    if !ctx.has_word(MAX_WORDS) {
        return None;
    }
    Some(extreme(ctx, "MAX", "max", |m| m.max_column, RANK_BY_MAX, "DESC"))
}

fn minimum_rule(ctx: &Context) -> Option<String> {
    if !ctx.has_word(MIN_WORDS) {
        return None;
    }
    Some(extreme(ctx, "MIN", "min", |m| m.min_column, RANK_BY_MIN, "ASC"))
}

/// Row(s) holding the extreme value of a measurement column, or a top-10
/// list when no measurement keyword is present.
fn extreme(
    ctx: &Context,
    aggregate: &str,
    alias_prefix: &str,
    measure_column: fn(&Measure) -> &'static str,
    rank_default: &str,
    direction: &str,
) -> String {
    if let Some(measure) = ctx.measure() {
        let target = ctx.qualified(measure, measure_column(measure));
        return match ctx.column(&target) {
            Some(column) => format!(
                "SELECT *, {col} AS {prefix}_{alias} FROM {table} WHERE {col} = (SELECT {agg}({col}) FROM {table})",
                col = column,
                prefix = alias_prefix,
                alias = target,
                table = ctx.table,
                agg = aggregate,
            ),
            None => ctx.listing(),
        };
    }

    match ctx.mentioned_column().or_else(|| ctx.column(rank_default)) {
        Some(column) => format!(
            "SELECT * FROM {} ORDER BY {} {} LIMIT {}",
            ctx.table, column, direction, RANKING_LIMIT
        ),
        None => ctx.listing(),
    }
}
