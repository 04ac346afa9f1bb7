use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::impact::{AffectedFile, ChangeKind, FileKind, ImpactCategory, ImpactResult};
use crate::priority::Priority;

/// One unit of work for the content generator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTask {
    pub path: String,
    pub kind: FileKind,
    pub category: ImpactCategory,
    pub change_kind: ChangeKind,
    pub task: String,
    pub priority: Priority,
    pub dependencies: Vec<String>,
    pub estimated_complexity: u8,
    pub instructions: String,
    pub validation_criteria: Vec<String>,
}

impl FileTask {
    pub fn from_affected(category: ImpactCategory, file: &AffectedFile, request: &str) -> Self {
        Self {
            path: file.path.clone(),
            kind: file.kind,
            category,
            change_kind: file.change_kind,
            task: file.task.clone(),
            priority: file.priority,
            dependencies: file.dependencies.clone(),
            estimated_complexity: file.estimated_complexity,
            instructions: render_instructions(file, request),
            validation_criteria: validation_criteria(file.kind),
        }
    }
}

type InstructionTemplate = fn(&AffectedFile, &str) -> String;

fn code_template(file: &AffectedFile, request: &str) -> String {
    format!(
        "You are modifying source code.\n\
         File: {path}\n\
         Task: {task}\n\
         Original request: {request}\n\n\
         Keep the existing public interface unless the task requires changing it, \
         follow the conventions already used in this file, and do not touch unrelated code.",
        path = file.path,
        task = file.task,
    )
}

fn config_template(file: &AffectedFile, request: &str) -> String {
    format!(
        "You are updating a configuration file.\n\
         File: {path}\n\
         Task: {task}\n\
         Original request: {request}\n\n\
         Change only the keys this request needs, keep the file's format and ordering, \
         and never add secrets or credentials.",
        path = file.path,
        task = file.task,
    )
}

fn documentation_template(file: &AffectedFile, request: &str) -> String {
    format!(
        "You are updating documentation.\n\
         File: {path}\n\
         Task: {task}\n\
         Original request: {request}\n\n\
         Describe the behaviour as it is after the change, update any examples that \
         no longer match, and keep the existing heading structure.",
        path = file.path,
        task = file.task,
    )
}

fn test_template(file: &AffectedFile, request: &str) -> String {
    let action = if file.change_kind == ChangeKind::Create {
        "Create this test file"
    } else {
        "Update this test file"
    };
    format!(
        "You are writing tests.\n\
         File: {path}\n\
         Task: {task}\n\
         Original request: {request}\n\n\
         {action} using the project's existing test framework. Cover the new behaviour \
         and its edge cases, and keep tests independent of each other.",
        path = file.path,
        task = file.task,
    )
}

fn deployment_template(file: &AffectedFile, request: &str) -> String {
    format!(
        "You are updating deployment configuration.\n\
         File: {path}\n\
         Task: {task}\n\
         Original request: {request}\n\n\
         Keep builds reproducible, pin versions that are already pinned, and do not \
         weaken any existing security setting.",
        path = file.path,
        task = file.task,
    )
}

fn static_template(file: &AffectedFile, request: &str) -> String {
    format!(
        "File: {path}\nTask: {task}\nOriginal request: {request}",
        path = file.path,
        task = file.task,
    )
}

fn template_for(kind: FileKind) -> InstructionTemplate {
    match kind {
        FileKind::Code => code_template,
        FileKind::Config => config_template,
        FileKind::Documentation => documentation_template,
        FileKind::Test => test_template,
        FileKind::Deployment => deployment_template,
        FileKind::Static => static_template,
    }
}

/// Directive for the generator: the kind template plus dependency call-outs
pub fn render_instructions(file: &AffectedFile, request: &str) -> String {
    let mut instructions = template_for(file.kind)(file, request);
    match file.change_kind {
        ChangeKind::Create => instructions.push_str("\nThis file does not exist yet; create it."),
        ChangeKind::Delete => instructions.push_str("\nThis file should be removed."),
        ChangeKind::Rename => instructions.push_str("\nThis file is being renamed; update references."),
        ChangeKind::Update => {}
    }
    if !file.dependencies.is_empty() {
        instructions.push_str("\n\nDepends on changes to:");
        for dependency in &file.dependencies {
            instructions.push_str("\n- ");
            instructions.push_str(dependency);
        }
        instructions.push_str("\nStay consistent with those files as they are after their own changes.");
    }
    instructions
}

pub fn validation_criteria(kind: FileKind) -> Vec<String> {
    let criteria: &[&str] = match kind {
        FileKind::Code => &["compiles without errors", "no new lint errors", "existing behaviour preserved"],
        FileKind::Config => &["file parses", "no credentials committed"],
        FileKind::Documentation => &["matches the implemented behaviour", "examples are accurate"],
        FileKind::Test => &["tests run successfully", "new functionality covered"],
        FileKind::Deployment => &["deployment configuration validates", "no weakened security settings"],
        FileKind::Static => &["asset referenced correctly"],
    };
    criteria.iter().map(|c| c.to_string()).collect()
}

/// One task per affected file; a path listed in more than one category keeps
/// its first (most specific) occurrence.
pub fn convert_tasks(impact: &ImpactResult, request: &str) -> Vec<FileTask> {
    let mut seen = HashSet::new();
    impact
        .files()
        .filter(|(_, file)| seen.insert(file.path.clone()))
        .map(|(category, file)| FileTask::from_affected(category, file, request))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instructions_embed_task_request_and_dependencies() {
        let file = AffectedFile::new("src/a.test.ts", FileKind::Test, "Cover login", Priority::Medium)
            .with_change(ChangeKind::Create)
            .with_dependencies(vec!["src/a.ts".to_string()]);
        let instructions = render_instructions(&file, "add validation");
        assert!(instructions.contains("File: src/a.test.ts"));
        assert!(instructions.contains("Task: Cover login"));
        assert!(instructions.contains("Original request: add validation"));
        assert!(instructions.contains("Create this test file"));
        assert!(instructions.contains("- src/a.ts"));
    }

    #[test]
    fn test_criteria_by_kind() {
        assert!(validation_criteria(FileKind::Code).contains(&"compiles without errors".to_string()));
        assert!(validation_criteria(FileKind::Test).contains(&"new functionality covered".to_string()));
    }

    #[test]
    fn test_conversion_is_one_to_one_and_deduplicated() {
        let primary = vec![AffectedFile::new("src/a.ts", FileKind::Code, "t", Priority::Critical)];
        let cascading = vec![
            AffectedFile::new("src/b.ts", FileKind::Code, "t", Priority::High),
            AffectedFile::new("src/a.ts", FileKind::Code, "t", Priority::Low),
        ];
        let impact = ImpactResult::from_categories(primary, cascading, vec![], vec![], vec![], vec![], vec![]);
        let tasks = convert_tasks(&impact, "req");
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].category, ImpactCategory::Primary);
        assert_eq!(tasks[0].priority, Priority::Critical);
    }
}
