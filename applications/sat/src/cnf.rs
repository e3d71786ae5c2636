//! DIMACS CNF parsing, with the MC-competition weight extension
//! (`c weight <literal> <value>` comment lines) gpusat reads to build a
//! weighted [`SatFormula`].
//!
//! This is a collaborator to the engine (spec §1 "out of scope"): the
//! engine only ever sees the resulting [`SatFormula`] value.

use gpusat_types::SatFormula;
use std::fmt;
use std::path::Path;

#[derive(Debug)]
pub enum CnfError {
    Io(std::io::Error),
    MissingHeader,
    BadHeader(String),
    BadLiteral(String),
    ClauseCountMismatch { declared: usize, found: usize },
    BadWeightLine(String),
}

impl fmt::Display for CnfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CnfError::Io(e) => write!(f, "could not read CNF file: {e}"),
            CnfError::MissingHeader => write!(f, "CNF file has no 'p cnf' header"),
            CnfError::BadHeader(line) => write!(f, "malformed 'p cnf' header: {line:?}"),
            CnfError::BadLiteral(tok) => write!(f, "not an integer literal: {tok:?}"),
            CnfError::ClauseCountMismatch { declared, found } => {
                write!(f, "header declared {declared} clauses, file has {found}")
            }
            CnfError::BadWeightLine(line) => write!(f, "malformed weight comment: {line:?}"),
        }
    }
}

impl From<std::io::Error> for CnfError {
    fn from(e: std::io::Error) -> Self {
        CnfError::Io(e)
    }
}

/// Parses a DIMACS CNF file from disk.
pub fn parse_file(path: &Path) -> Result<SatFormula, CnfError> {
    let text = std::fs::read_to_string(path)?;
    parse_str(&text)
}

/// Parses DIMACS CNF text. `c` lines are comments, except `c weight <lit>
/// <value>` which sets that literal's weight (default 1.0). The formula is
/// weighted ([`SatFormula::is_weighted`]) iff at least one weight line was
/// present.
pub fn parse_str(text: &str) -> Result<SatFormula, CnfError> {
    let mut num_vars = None;
    let mut declared_clauses = None;
    let mut clauses = Vec::new();
    let mut current = Vec::new();
    let mut weight_overrides: Vec<(i32, f64)> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix('c') {
            let rest = rest.trim();
            if let Some(spec) = rest.strip_prefix("weight") {
                let mut it = spec.split_whitespace();
                let lit: i32 = it
                    .next()
                    .and_then(|t| t.parse().ok())
                    .ok_or_else(|| CnfError::BadWeightLine(line.to_string()))?;
                let value: f64 = it
                    .next()
                    .and_then(|t| t.parse().ok())
                    .ok_or_else(|| CnfError::BadWeightLine(line.to_string()))?;
                weight_overrides.push((lit, value));
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix('p') {
            let mut it = rest.split_whitespace();
            let kind = it.next().ok_or_else(|| CnfError::BadHeader(line.to_string()))?;
            if kind != "cnf" {
                return Err(CnfError::BadHeader(line.to_string()));
            }
            let n: u32 = it
                .next()
                .and_then(|t| t.parse().ok())
                .ok_or_else(|| CnfError::BadHeader(line.to_string()))?;
            let m: usize = it
                .next()
                .and_then(|t| t.parse().ok())
                .ok_or_else(|| CnfError::BadHeader(line.to_string()))?;
            num_vars = Some(n);
            declared_clauses = Some(m);
            continue;
        }

        for tok in line.split_whitespace() {
            let lit: i32 = tok.parse().map_err(|_| CnfError::BadLiteral(tok.to_string()))?;
            if lit == 0 {
                clauses.push(std::mem::take(&mut current));
            } else {
                current.push(lit);
            }
        }
    }
    if !current.is_empty() {
        clauses.push(current);
    }

    let num_vars = num_vars.ok_or(CnfError::MissingHeader)?;
    if let Some(declared) = declared_clauses {
        if declared != clauses.len() {
            return Err(CnfError::ClauseCountMismatch { declared, found: clauses.len() });
        }
    }

    let mut formula = SatFormula::unweighted(num_vars, clauses);
    if !weight_overrides.is_empty() {
        formula.weights = vec![1.0; 2 * num_vars as usize];
        for (lit, value) in weight_overrides {
            let var = lit.unsigned_abs() - 1;
            let idx = (var * 2) as usize + if lit > 0 { 0 } else { 1 };
            if let Some(slot) = formula.weights.get_mut(idx) {
                *slot = value;
            }
        }
    }
    Ok(formula)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_unweighted_formula() {
        let formula = parse_str("p cnf 2 2\n1 2 0\n-1 -2 0\n").unwrap();
        assert_eq!(formula.num_vars, 2);
        assert_eq!(formula.clauses, vec![vec![1, 2], vec![-1, -2]]);
        assert!(!formula.is_weighted());
    }

    #[test]
    fn ignores_plain_comments_and_blank_lines() {
        let formula = parse_str("c a comment\n\np cnf 1 1\nc another\n1 0\n").unwrap();
        assert_eq!(formula.clauses, vec![vec![1]]);
    }

    #[test]
    fn applies_weight_comment_lines() {
        let formula = parse_str("c weight 1 0.3\nc weight -1 0.7\np cnf 1 1\n1 0\n").unwrap();
        assert!(formula.is_weighted());
        assert_eq!(formula.literal_weight(1), 0.3);
        assert_eq!(formula.literal_weight(-1), 0.7);
    }

    #[test]
    fn rejects_clause_count_mismatch() {
        let err = parse_str("p cnf 1 2\n1 0\n").unwrap_err();
        matches!(err, CnfError::ClauseCountMismatch { declared: 2, found: 1 });
    }

    #[test]
    fn rejects_missing_header() {
        let err = parse_str("1 2 0\n").unwrap_err();
        assert!(matches!(err, CnfError::MissingHeader));
    }
}
