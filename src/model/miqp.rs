//! Solver-independent MIQP builder.
//!
//! A [`MiqpModel`] holds named continuous and binary variables with bounds,
//! named linear constraints and an objective given as a sum of squared
//! linear expressions. Candidate assignments can be checked and evaluated
//! without a solver, and the model can be exported in CPLEX LP format for
//! any external one.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::{self, Write};

/// Index of a variable in its model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

impl VarId {
    /// Id of the variable at position `index`, as reported by a backend.
    pub fn from_index(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Continuous,
    Binary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub kind: VarKind,
    pub lower: f64,
    pub upper: f64,
}

/// Affine expression `sum(coeff * var) + constant`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearExpr {
    terms: Vec<(VarId, f64)>,
    constant: f64,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constant(value: f64) -> Self {
        Self {
            terms: Vec::new(),
            constant: value,
        }
    }

    /// Builder form of [`Self::add_term`].
    pub fn term(mut self, var: VarId, coeff: f64) -> Self {
        self.add_term(var, coeff);
        self
    }

    pub fn add_term(&mut self, var: VarId, coeff: f64) {
        self.terms.push((var, coeff));
    }

    pub fn add_constant(&mut self, value: f64) {
        self.constant += value;
    }

    pub fn terms(&self) -> &[(VarId, f64)] {
        &self.terms
    }

    pub fn constant_term(&self) -> f64 {
        self.constant
    }

    /// Value of the expression under an assignment indexed by [`VarId`].
    ///
    /// Variables missing from `values` count as zero.
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|&(var, coeff)| coeff * values.get(var.0).copied().unwrap_or(0.0))
            .sum::<f64>()
            + self.constant
    }

    /// Terms with repeated variables merged and zero coefficients dropped.
    fn merged(&self) -> BTreeMap<VarId, f64> {
        let mut merged = BTreeMap::new();
        for &(var, coeff) in &self.terms {
            *merged.entry(var).or_insert(0.0) += coeff;
        }
        merged.retain(|_, coeff| *coeff != 0.0);
        merged
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Le,
    Ge,
    Eq,
}

impl fmt::Display for Sense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Eq => "=",
        })
    }
}

/// Named linear constraint `expr <sense> rhs`.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub name: String,
    pub expr: LinearExpr,
    pub sense: Sense,
    pub rhs: f64,
}

impl Constraint {
    /// Amount by which an assignment violates the constraint, 0 when satisfied.
    pub fn violation(&self, values: &[f64]) -> f64 {
        let lhs = self.expr.evaluate(values);
        match self.sense {
            Sense::Le => (lhs - self.rhs).max(0.0),
            Sense::Ge => (self.rhs - lhs).max(0.0),
            Sense::Eq => (lhs - self.rhs).abs(),
        }
    }
}

/// A violated bound, integrality requirement or constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub name: String,
    pub amount: f64,
}

/// Mixed-integer model with a convex quadratic objective to minimize.
#[derive(Debug, Clone, Default)]
pub struct MiqpModel {
    name: String,
    variables: Vec<Variable>,
    by_name: HashMap<String, VarId>,
    constraints: Vec<Constraint>,
    objective: Vec<LinearExpr>,
}

impl MiqpModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds a continuous variable bounded by `[lower, upper]`.
    ///
    /// # Panics
    ///
    /// Panics if the name is already taken or `lower > upper`.
    pub fn add_continuous(&mut self, name: impl Into<String>, lower: f64, upper: f64) -> VarId {
        assert!(lower <= upper, "empty bounds");
        self.push_variable(name.into(), VarKind::Continuous, lower, upper)
    }

    /// Adds a 0/1 variable.
    ///
    /// # Panics
    ///
    /// Panics if the name is already taken.
    pub fn add_binary(&mut self, name: impl Into<String>) -> VarId {
        self.push_variable(name.into(), VarKind::Binary, 0.0, 1.0)
    }

    fn push_variable(&mut self, name: String, kind: VarKind, lower: f64, upper: f64) -> VarId {
        let id = VarId(self.variables.len());
        let previous = self.by_name.insert(name.clone(), id);
        assert!(previous.is_none(), "duplicate variable name {name}");
        self.variables.push(Variable {
            name,
            kind,
            lower,
            upper,
        });
        id
    }

    pub fn add_constraint(
        &mut self,
        name: impl Into<String>,
        expr: LinearExpr,
        sense: Sense,
        rhs: f64,
    ) {
        self.constraints.push(Constraint {
            name: name.into(),
            expr,
            sense,
            rhs,
        });
    }

    /// Adds `expr^2` to the objective.
    pub fn add_squared_objective(&mut self, expr: LinearExpr) {
        self.objective.push(expr);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, id: VarId) -> &Variable {
        &self.variables[id.0]
    }

    pub fn find_variable(&self, name: &str) -> Option<VarId> {
        self.by_name.get(name).copied()
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_binaries(&self) -> usize {
        self.variables
            .iter()
            .filter(|v| v.kind == VarKind::Binary)
            .count()
    }

    /// Objective value of an assignment.
    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.objective
            .iter()
            .map(|expr| {
                let v = expr.evaluate(values);
                v * v
            })
            .sum()
    }

    /// Everything an assignment violates by more than `tolerance`.
    ///
    /// A missing value is reported as a violation of its variable.
    pub fn violations(&self, values: &[f64], tolerance: f64) -> Vec<Violation> {
        let mut found = Vec::new();
        for (i, var) in self.variables.iter().enumerate() {
            let Some(&value) = values.get(i) else {
                found.push(Violation {
                    name: var.name.clone(),
                    amount: f64::INFINITY,
                });
                continue;
            };
            let mut amount = (var.lower - value).max(value - var.upper).max(0.0);
            if var.kind == VarKind::Binary {
                amount = amount.max((value - value.round()).abs());
            }
            if amount > tolerance || !value.is_finite() {
                found.push(Violation {
                    name: var.name.clone(),
                    amount,
                });
            }
        }
        found.extend(self.constraints.iter().filter_map(|c| {
            let amount = c.violation(values);
            (amount > tolerance || amount.is_nan()).then(|| Violation {
                name: c.name.clone(),
                amount,
            })
        }));
        found
    }

    pub fn is_feasible(&self, values: &[f64], tolerance: f64) -> bool {
        self.violations(values, tolerance).is_empty()
    }

    /// Writes the model in CPLEX LP format.
    ///
    /// The squared objective terms are expanded into linear, quadratic and
    /// constant parts.
    pub fn write_lp<W: Write>(&self, mut out: W) -> io::Result<()> {
        writeln!(out, "\\ Model {}", self.name)?;
        writeln!(out, "Minimize")?;
        write!(out, " obj:")?;

        let mut linear: BTreeMap<VarId, f64> = BTreeMap::new();
        let mut quadratic: BTreeMap<(VarId, VarId), f64> = BTreeMap::new();
        let mut constant = 0.0;
        for expr in &self.objective {
            let terms: Vec<(VarId, f64)> = expr.merged().into_iter().collect();
            let c = expr.constant;
            constant += c * c;
            for (k, &(a, ca)) in terms.iter().enumerate() {
                *linear.entry(a).or_insert(0.0) += 2.0 * c * ca;
                *quadratic.entry((a, a)).or_insert(0.0) += ca * ca;
                for &(b, cb) in &terms[k + 1..] {
                    *quadratic.entry((a, b)).or_insert(0.0) += 2.0 * ca * cb;
                }
            }
        }

        let mut line = TermLine::new();
        for (var, coeff) in linear.into_iter().filter(|&(_, c)| c != 0.0) {
            line.push(&mut out, coeff, &self.variables[var.0].name)?;
        }
        if !quadratic.is_empty() {
            write!(out, " + [")?;
            line.restart();
            for ((a, b), coeff) in quadratic.into_iter().filter(|&(_, c)| c != 0.0) {
                let term = if a == b {
                    format!("{} ^ 2", self.variables[a.0].name)
                } else {
                    format!("{} * {}", self.variables[a.0].name, self.variables[b.0].name)
                };
                // LP format halves the bracketed quadratic part.
                line.push(&mut out, 2.0 * coeff, &term)?;
            }
            write!(out, " ] / 2")?;
        }
        if constant != 0.0 {
            write!(out, " + {constant}")?;
        }
        writeln!(out)?;

        writeln!(out, "Subject To")?;
        for c in &self.constraints {
            write!(out, " {}:", c.name)?;
            let terms = c.expr.merged();
            let mut line = TermLine::new();
            if terms.is_empty() {
                if let Some(first) = self.variables.first() {
                    line.push(&mut out, 0.0, &first.name)?;
                }
            }
            for (var, coeff) in terms {
                line.push(&mut out, coeff, &self.variables[var.0].name)?;
            }
            writeln!(out, " {} {}", c.sense, c.rhs - c.expr.constant)?;
        }

        writeln!(out, "Bounds")?;
        for var in self
            .variables
            .iter()
            .filter(|v| v.kind == VarKind::Continuous)
        {
            if var.lower == 0.0 && var.upper == f64::INFINITY {
                continue;
            }
            writeln!(
                out,
                " {} <= {} <= {}",
                lp_bound(var.lower),
                var.name,
                lp_bound(var.upper)
            )?;
        }

        let binaries: Vec<&Variable> = self
            .variables
            .iter()
            .filter(|v| v.kind == VarKind::Binary)
            .collect();
        if !binaries.is_empty() {
            writeln!(out, "Binaries")?;
            for var in binaries {
                writeln!(out, " {}", var.name)?;
            }
        }
        writeln!(out, "End")
    }
}

fn lp_bound(value: f64) -> String {
    if value == f64::INFINITY {
        "+inf".into()
    } else if value == f64::NEG_INFINITY {
        "-inf".into()
    } else {
        value.to_string()
    }
}

/// Writes signed terms, wrapping long expressions over several lines.
struct TermLine {
    written: usize,
}

impl TermLine {
    const TERMS_PER_LINE: usize = 8;

    fn new() -> Self {
        Self { written: 0 }
    }

    fn restart(&mut self) {
        self.written = 0;
    }

    fn push<W: Write>(&mut self, out: &mut W, coeff: f64, term: &str) -> io::Result<()> {
        if self.written > 0 && self.written % Self::TERMS_PER_LINE == 0 {
            write!(out, "\n   ")?;
        }
        let sign = if coeff < 0.0 { '-' } else { '+' };
        if self.written == 0 && sign == '+' {
            write!(out, " {} {term}", coeff.abs())?;
        } else {
            write!(out, " {sign} {} {term}", coeff.abs())?;
        }
        self.written += 1;
        Ok(())
    }
}
