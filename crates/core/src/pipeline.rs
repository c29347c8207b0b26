use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::duplicates::{FunctionIndex, group_candidates};
use crate::error::Result;
use crate::extract::extract;
use crate::plan::{load_plan, save_plan, synthesize_plan};
use crate::report::generate_report;
use crate::rewrite::{Rewriter, save_results, select_entries};
use crate::scan::{ScriptFiles, load_registry};
use crate::similarity::score_groups;
use crate::types::{
    AnalysisStats, CandidateGroup, ConsolidateOptions, ExecutionResult, PlanEntry, ScriptRecord,
};

/// Outcome of one analysis pass.
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    pub records: Vec<ScriptRecord>,
    pub index: FunctionIndex,
    /// Scored candidate groups, best first.
    pub groups: Vec<CandidateGroup>,
    pub stats: AnalysisStats,
}

/// Reads every registered script, extracts its functions and builds the
/// scored candidate groups.
pub fn analyze_scripts(options: &ConsolidateOptions, files: &ScriptFiles) -> Result<Analysis> {
    let mut stats = AnalysisStats::default();
    let entries = load_registry(options, &mut stats)?;

    let mut records = Vec::with_capacity(entries.len());
    let mut texts: HashMap<String, String> = HashMap::new();
    for entry in entries {
        let text = match files.read_text(&entry.path) {
            Ok(text) => text,
            Err(skip) => {
                warn!(path = %entry.path, reason = %skip.describe(), "skipping script");
                skip.count(&mut stats);
                continue;
            }
        };
        stats.scanned_scripts = stats.scanned_scripts.saturating_add(1);
        stats.scanned_bytes = stats.scanned_bytes.saturating_add(text.len() as u64);

        let extraction = extract(entry.dialect, &text);
        debug!(
            path = %entry.path,
            dialect = %entry.dialect,
            functions = extraction.functions.len(),
            imports = extraction.imports.len(),
            "extracted"
        );
        let mut record = ScriptRecord::new(entry.path.clone(), entry.dialect);
        record.functions = extraction.functions;
        record.classes = extraction.classes;
        record.imports = extraction.imports;
        records.push(record);
        texts.insert(entry.path, text);
    }

    let index = FunctionIndex::build(&records);
    let mut groups = group_candidates(&index, &records, options.min_shared_functions);
    score_groups(&mut groups, &records, &texts);

    stats.indexed_functions = index.len() as u64;
    stats.duplicated_functions = index.duplicated().count() as u64;
    stats.candidate_groups = groups.len() as u64;
    info!(
        scripts = stats.scanned_scripts,
        functions = stats.indexed_functions,
        duplicated = stats.duplicated_functions,
        groups = stats.candidate_groups,
        "analysis finished"
    );

    Ok(Analysis {
        records,
        index,
        groups,
        stats,
    })
}

/// One invocation's worth of state: options plus whatever earlier stages of
/// the same run produced.
#[derive(Debug)]
pub struct Consolidator {
    options: ConsolidateOptions,
    files: ScriptFiles,
    analysis: Option<Analysis>,
    plan: Option<Vec<PlanEntry>>,
}

impl Consolidator {
    pub fn new(options: ConsolidateOptions) -> Self {
        let files = ScriptFiles::new(&options);
        Self {
            options,
            files,
            analysis: None,
            plan: None,
        }
    }

    pub fn options(&self) -> &ConsolidateOptions {
        &self.options
    }

    pub fn files(&self) -> &ScriptFiles {
        &self.files
    }

    pub fn analysis(&self) -> Option<&Analysis> {
        self.analysis.as_ref()
    }

    pub fn analyze(&mut self) -> Result<&Analysis> {
        let analysis = analyze_scripts(&self.options, &self.files)?;
        Ok(self.analysis.insert(analysis))
    }

    /// Synthesizes the plan from this run's analysis (running it first when
    /// needed) and persists it.
    pub fn plan(&mut self) -> Result<&[PlanEntry]> {
        if self.analysis.is_none() {
            self.analyze()?;
        }
        let groups = self.analysis.as_ref().map_or(&[][..], |a| a.groups.as_slice());
        let plan = synthesize_plan(groups, &self.options);

        let plan_path = self.options.resolve(&self.options.plan_path);
        save_plan(&plan_path, &plan)?;
        info!(path = %plan_path.display(), entries = plan.len(), "plan saved");
        Ok(self.plan.insert(plan).as_slice())
    }

    /// Executes the selected entries of this run's plan, or of the plan
    /// artifact when no plan was made in this run. Results are persisted
    /// unless `dry_run`.
    pub fn execute(
        &mut self,
        group_ids: Option<&[usize]>,
        dry_run: bool,
    ) -> Result<Vec<ExecutionResult>> {
        if self.plan.is_none() {
            let plan_path = self.options.resolve(&self.options.plan_path);
            self.plan = Some(load_plan(&plan_path)?);
        }
        let plan = self.plan.as_deref().unwrap_or_default();
        let selected = select_entries(plan, group_ids);
        let rewriter = Rewriter::new(&self.files, &self.options);
        let results = rewriter.execute(&selected, dry_run);

        if !dry_run {
            let results_path = self.options.resolve(&self.options.results_path);
            save_results(&results_path, &results)?;
            info!(path = %results_path.display(), results = results.len(), "results saved");
        }
        Ok(results)
    }

    pub fn report(&self) -> Result<PathBuf> {
        generate_report(&self.options)
    }
}
