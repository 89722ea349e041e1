//! Interchange files: CPLEX LP and free MPS out, solver solution files back in.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{OptimizerError, Result};
use crate::model::{Model, Relation, Sense, VarId, VarKind};
use crate::solver::{SolveStatus, SolverSolution};

/// LP readers choke on very long lines, so expressions wrap after this many terms.
const TERMS_PER_LINE: usize = 8;

fn write_expression<W: Write>(out: &mut W, terms: &[(String, f64)]) -> io::Result<()> {
    if terms.is_empty() {
        return Ok(());
    }
    let mut line = String::new();
    for (position, (name, coefficient)) in terms.iter().enumerate() {
        if position > 0 && position % TERMS_PER_LINE == 0 {
            writeln!(out, "{line}")?;
            line.clear();
            line.push_str("   ");
        }
        let sign = if *coefficient < 0.0 { '-' } else { '+' };
        if position == 0 && sign == '+' {
            let _ = write!(line, " {} {name}", coefficient.abs());
        } else {
            let _ = write!(line, " {sign} {} {name}", coefficient.abs());
        }
    }
    writeln!(out, "{line}")
}

/// Write the model in CPLEX LP format using the variables' own names.
pub fn write_lp<W: Write>(model: &Model, out: &mut W) -> io::Result<()> {
    let name = |var: VarId| model.variable(var).name.clone();
    writeln!(out, "\\ {}", model.name)?;
    if model.objective.constant_term() != 0.0 {
        writeln!(
            out,
            "\\ objective constant {} is not part of the file",
            model.objective.constant_term()
        )?;
    }
    writeln!(
        out,
        "{}",
        match model.sense {
            Sense::Maximise => "Maximize",
            Sense::Minimise => "Minimize",
        }
    )?;
    let mut objective: Vec<(String, f64)> = model
        .objective
        .terms()
        .map(|(var, coefficient)| (name(var), coefficient))
        .collect();
    if objective.is_empty() {
        if let Some(first) = model.variables().first() {
            objective.push((first.name.clone(), 0.0));
        }
    }
    write!(out, " obj:")?;
    write_expression(out, &objective)?;

    writeln!(out, "Subject To")?;
    for constraint in model.constraints() {
        write!(out, " {}:", constraint.name)?;
        let terms: Vec<(String, f64)> = constraint
            .expr
            .terms()
            .map(|(var, coefficient)| (name(var), coefficient))
            .collect();
        write_expression(out, &terms)?;
        let relation = match constraint.relation {
            Relation::LessEqual => "<=",
            Relation::GreaterEqual => ">=",
            Relation::Equal => "=",
        };
        writeln!(out, "   {relation} {}", constraint.rhs)?;
    }

    writeln!(out, "Bounds")?;
    for variable in model.variables() {
        if variable.kind == VarKind::Binary {
            continue;
        }
        match variable.upper {
            Some(upper) => writeln!(out, " {} <= {} <= {upper}", variable.lower, variable.name)?,
            None if variable.lower != 0.0 => {
                writeln!(out, " {} >= {}", variable.name, variable.lower)?;
            }
            None => {}
        }
    }

    for (section, kind) in [("Generals", VarKind::Integer), ("Binaries", VarKind::Binary)] {
        let names: Vec<&str> = model
            .variables()
            .iter()
            .filter(|variable| variable.kind == kind)
            .map(|variable| variable.name.as_str())
            .collect();
        if names.is_empty() {
            continue;
        }
        writeln!(out, "{section}")?;
        for chunk in names.chunks(TERMS_PER_LINE) {
            writeln!(out, " {}", chunk.join(" "))?;
        }
    }
    writeln!(out, "End")
}

/// Write the model in free MPS format.
///
/// Columns and rows are renamed to `C0000000` and `R0000000` so the file stays
/// within the identifier limits of older readers. MPS has no portable way to say
/// "maximise", so a maximisation objective is written negated.
pub fn write_mps<W: Write>(model: &Model, out: &mut W) -> io::Result<()> {
    let objective_sign = match model.sense {
        Sense::Maximise => -1.0,
        Sense::Minimise => 1.0,
    };
    let mut columns: Vec<Vec<(String, f64)>> = vec![Vec::new(); model.variables().len()];
    for (var, coefficient) in model.objective.terms() {
        columns[var.index()].push(("OBJ".to_owned(), coefficient * objective_sign));
    }
    for (row, constraint) in model.constraints().iter().enumerate() {
        for (var, coefficient) in constraint.expr.terms() {
            columns[var.index()].push((Model::row_name(row), coefficient));
        }
    }

    writeln!(out, "NAME {}", model.name)?;
    if model.sense == Sense::Maximise {
        writeln!(out, "* objective negated, minimise to maximise the original")?;
    }
    writeln!(out, "ROWS")?;
    writeln!(out, " N  OBJ")?;
    for (row, constraint) in model.constraints().iter().enumerate() {
        let kind = match constraint.relation {
            Relation::LessEqual => 'L',
            Relation::GreaterEqual => 'G',
            Relation::Equal => 'E',
        };
        writeln!(out, " {kind}  {}", Model::row_name(row))?;
    }

    writeln!(out, "COLUMNS")?;
    let mut integer_block = false;
    let mut markers = 0_usize;
    for (index, entries) in columns.iter().enumerate() {
        let var = model.variables()[index].kind;
        let integral = var != VarKind::Continuous;
        if integral != integer_block {
            let kind = if integral { "INTORG" } else { "INTEND" };
            writeln!(out, "    MARKER{markers:04} 'MARKER' '{kind}'")?;
            markers += 1;
            integer_block = integral;
        }
        let column = Model::column_name(VarId::from_index(index));
        if entries.is_empty() {
            writeln!(out, "    {column} OBJ 0")?;
        }
        for (row, coefficient) in entries {
            writeln!(out, "    {column} {row} {coefficient}")?;
        }
    }
    if integer_block {
        writeln!(out, "    MARKER{markers:04} 'MARKER' 'INTEND'")?;
    }

    writeln!(out, "RHS")?;
    for (row, constraint) in model.constraints().iter().enumerate() {
        if constraint.rhs != 0.0 {
            writeln!(out, "    RHS {} {}", Model::row_name(row), constraint.rhs)?;
        }
    }

    writeln!(out, "BOUNDS")?;
    for (index, variable) in model.variables().iter().enumerate() {
        let column = Model::column_name(VarId::from_index(index));
        if variable.lower != 0.0 {
            writeln!(out, " LO BND {column} {}", variable.lower)?;
        }
        match (variable.kind, variable.upper) {
            (VarKind::Binary, _) => writeln!(out, " UP BND {column} 1")?,
            (_, Some(upper)) => writeln!(out, " UP BND {column} {upper}")?,
            // integer columns inside markers default to an upper bound of 1 in some readers
            (VarKind::Integer, None) => writeln!(out, " PL BND {column}")?,
            (VarKind::Continuous, None) => {}
        }
    }
    writeln!(out, "ENDATA")
}

/// Paths of an exported model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedModel {
    pub lp: PathBuf,
    pub mps: PathBuf,
}

/// Write `<stem>.lp` and `<stem>.mps` into `directory`.
pub fn export_model(model: &Model, directory: &Path, stem: &str) -> Result<ExportedModel> {
    fs::create_dir_all(directory)?;
    let lp = directory.join(format!("{stem}.lp"));
    let mps = directory.join(format!("{stem}.mps"));

    let mut writer = io::BufWriter::new(fs::File::create(&lp)?);
    write_lp(model, &mut writer)?;
    writer.flush()?;
    let mut writer = io::BufWriter::new(fs::File::create(&mps)?);
    write_mps(model, &mut writer)?;
    writer.flush()?;

    info!(lp = %lp.display(), mps = %mps.display(), "exported model");
    Ok(ExportedModel { lp, mps })
}

/// Which names a solution file uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Naming {
    /// the LP file's variable names
    Lp,
    /// the MPS file's `C0000000` column identifiers
    Mps,
}

/// Solution file flavours accepted for re-ingestion, told apart by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolutionKind {
    /// `.sol`: CBC's own solution output
    CbcNative,
    /// `.lpsol`: `name value` lines keyed by LP names
    LpListing,
    /// `.mpssol`: `name value` lines keyed by MPS column identifiers
    MpsListing,
}

impl SolutionKind {
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|extension| extension.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("sol") => Ok(Self::CbcNative),
            Some("lpsol") => Ok(Self::LpListing),
            Some("mpssol") => Ok(Self::MpsListing),
            _ => Err(OptimizerError::SolutionFormat(format!(
                "{} does not have a recognised extension (.sol, .lpsol, .mpssol)",
                path.display()
            ))),
        }
    }

    #[must_use]
    pub const fn naming(self) -> Naming {
        match self {
            Self::CbcNative | Self::LpListing => Naming::Lp,
            Self::MpsListing => Naming::Mps,
        }
    }
}

/// A solution as read from disk, before names are resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSolution {
    pub status: SolveStatus,
    pub objective: Option<f64>,
    pub values: Vec<(String, f64)>,
}

fn parse_value(token: &str, line: &str) -> Result<f64> {
    token
        .parse()
        .map_err(|_| OptimizerError::SolutionFormat(format!("bad value in line {line:?}")))
}

fn trailing_number(line: &str) -> Option<f64> {
    line.split_whitespace().last()?.parse().ok()
}

/// CBC's solution output: a status line, then `index name value reduced-cost`.
pub fn parse_cbc_solution(text: &str) -> Result<ParsedSolution> {
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());
    let header = lines
        .next()
        .ok_or_else(|| OptimizerError::SolutionFormat("empty CBC solution".to_owned()))?;
    let lowered = header.to_ascii_lowercase();
    let status = if lowered.starts_with("optimal") {
        SolveStatus::Optimal
    } else if lowered.contains("infeasible") {
        SolveStatus::Infeasible
    } else if lowered.contains("unbounded") {
        SolveStatus::Unbounded
    } else if lowered.starts_with("stopped") {
        SolveStatus::NotSolved
    } else {
        SolveStatus::Undefined
    };
    let objective = header
        .split("objective value")
        .nth(1)
        .and_then(|rest| rest.trim().parse().ok());

    let mut values = Vec::new();
    for line in lines {
        let mut tokens = line.split_whitespace().peekable();
        // infeasible rows and columns are flagged with a leading "**"
        if tokens.peek() == Some(&"**") {
            tokens.next();
        }
        let (Some(_index), Some(name), Some(value)) = (tokens.next(), tokens.next(), tokens.next())
        else {
            return Err(OptimizerError::SolutionFormat(format!(
                "unexpected line {line:?} in CBC solution"
            )));
        };
        values.push((name.to_owned(), parse_value(value, line)?));
    }
    Ok(ParsedSolution {
        status,
        objective,
        values,
    })
}

/// HiGHS `--solution_file` output; only the model status and primal column
/// values are read.
pub fn parse_highs_solution(text: &str) -> Result<ParsedSolution> {
    let mut status = SolveStatus::Undefined;
    let mut objective = None;
    let mut values = Vec::new();
    let mut lines = text.lines().map(str::trim);

    while let Some(line) = lines.next() {
        if line == "Model status" {
            let reported = lines.find(|line| !line.is_empty()).unwrap_or_default();
            status = match reported.to_ascii_lowercase().as_str() {
                "optimal" => SolveStatus::Optimal,
                "infeasible" => SolveStatus::Infeasible,
                "unbounded" | "primal infeasible or unbounded" => SolveStatus::Unbounded,
                "time limit reached" | "interrupted by user" | "iteration limit reached" => {
                    SolveStatus::NotSolved
                }
                _ => SolveStatus::Undefined,
            };
        } else if line.starts_with("Objective") && objective.is_none() {
            objective = trailing_number(line);
        } else if let Some(count) = line.strip_prefix("# Columns") {
            let count: usize = count.trim().parse().map_err(|_| {
                OptimizerError::SolutionFormat(format!("bad column count in {line:?}"))
            })?;
            for _ in 0..count {
                let column = lines.next().ok_or_else(|| {
                    OptimizerError::SolutionFormat("HiGHS solution ends early".to_owned())
                })?;
                let mut tokens = column.split_whitespace();
                let (Some(name), Some(value)) = (tokens.next(), tokens.next()) else {
                    return Err(OptimizerError::SolutionFormat(format!(
                        "unexpected line {column:?} in HiGHS solution"
                    )));
                };
                values.push((name.to_owned(), parse_value(value, column)?));
            }
            break;
        }
    }
    Ok(ParsedSolution {
        status,
        objective,
        values,
    })
}

/// `name value` listings, optionally preceded by SCIP's `solution status:` and
/// `objective value:` header lines. Anything after the value is ignored.
pub fn parse_listing(text: &str) -> Result<ParsedSolution> {
    let mut status = SolveStatus::Optimal;
    let mut objective = None;
    let mut values = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(reported) = line.strip_prefix("solution status:") {
            let reported = reported.trim().to_ascii_lowercase();
            status = if reported.starts_with("optimal") {
                SolveStatus::Optimal
            } else if reported.contains("infeasible") {
                SolveStatus::Infeasible
            } else if reported.contains("unbounded") {
                SolveStatus::Unbounded
            } else if reported.contains("limit") || reported.contains("interrupt") {
                SolveStatus::NotSolved
            } else {
                SolveStatus::Undefined
            };
            continue;
        }
        if line.starts_with("objective value:") {
            objective = trailing_number(line);
            continue;
        }
        if line.starts_with("no solution available") {
            status = SolveStatus::NotSolved;
            continue;
        }
        let mut tokens = line.split_whitespace();
        let (Some(name), Some(value)) = (tokens.next(), tokens.next()) else {
            return Err(OptimizerError::SolutionFormat(format!(
                "expected `name value`, found {line:?}"
            )));
        };
        values.push((name.to_owned(), parse_value(value, line)?));
    }
    Ok(ParsedSolution {
        status,
        objective,
        values,
    })
}

/// Map named values onto the model's variables. Unknown names are an error,
/// variables the file does not mention are 0.
pub fn resolve_values(model: &Model, naming: Naming, values: &[(String, f64)]) -> Result<Vec<f64>> {
    let lookup: HashMap<String, VarId> = match naming {
        Naming::Lp => model
            .names()
            .into_iter()
            .map(|(name, var)| (name.to_owned(), var))
            .collect(),
        Naming::Mps => model.column_names(),
    };
    let mut resolved = vec![0.0; model.variables().len()];
    for (name, value) in values {
        let var = lookup
            .get(name)
            .ok_or_else(|| OptimizerError::UnknownVariable(name.clone()))?;
        resolved[var.index()] = *value;
    }
    Ok(resolved)
}

/// Read an uploaded solution file back against a rebuilt model.
pub fn read_solution_file(model: &Model, path: &Path) -> Result<SolverSolution> {
    let kind = SolutionKind::from_path(path)?;
    let text = fs::read_to_string(path)?;
    let parsed = match kind {
        SolutionKind::CbcNative => parse_cbc_solution(&text)?,
        SolutionKind::LpListing | SolutionKind::MpsListing => parse_listing(&text)?,
    };
    debug!(?kind, values = parsed.values.len(), status = ?parsed.status, "parsed solution file");
    let values = resolve_values(model, kind.naming(), &parsed.values)?;
    Ok(SolverSolution::from_values(model, parsed.status, values))
}
