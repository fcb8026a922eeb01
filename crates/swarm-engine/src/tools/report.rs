use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use swarm_core::tools::{Tool, ToolError};
use swarm_store::{NewEntry, SharedMemory};

const REPORT_CATEGORY: &str = "coordination";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Completed,
    PartiallyCompleted,
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Completed => "completed",
            Self::PartiallyCompleted => "partially_completed",
            Self::Failed => "failed",
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

#[derive(Debug, Deserialize)]
struct ReportArgs {
    task_status: TaskStatus,
    findings: String,
    #[serde(default)]
    recommendations: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    additional_data: Map<String, Value>,
}

fn default_confidence() -> f64 {
    80.0
}

#[derive(Debug, Deserialize)]
struct GuidanceArgs {
    question: String,
    context: String,
    #[serde(default)]
    urgency: Urgency,
}

fn parse<T: for<'de> Deserialize<'de>>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

fn or_none(text: &str) -> &str {
    if text.trim().is_empty() {
        "None"
    } else {
        text
    }
}

/// Final hand-off of a subagent. Calling it ends the subagent's run.
pub struct ReportResultsTool {
    memory: Arc<SharedMemory>,
    agent_name: String,
    task_id: String,
}

impl ReportResultsTool {
    pub fn new(memory: Arc<SharedMemory>, agent_name: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            memory,
            agent_name: agent_name.into(),
            task_id: task_id.into(),
        }
    }
}

fn format_report(args: &ReportArgs) -> String {
    let additional = if args.additional_data.is_empty() {
        "None".to_string()
    } else {
        Value::Object(args.additional_data.clone()).to_string()
    };
    format!(
        "SUBAGENT TASK REPORT\n\
         ====================\n\
         Status: {}\n\
         Confidence: {}%\n\
         \n\
         FINDINGS:\n\
         {}\n\
         \n\
         RECOMMENDATIONS:\n\
         {}\n\
         \n\
         ADDITIONAL DATA:\n\
         {}",
        args.task_status.to_string().to_uppercase(),
        args.confidence,
        args.findings,
        or_none(&args.recommendations),
        additional,
    )
}

#[async_trait]
impl Tool for ReportResultsTool {
    fn name(&self) -> &str {
        "report_results"
    }

    fn description(&self) -> &str {
        "Report findings and results back to the coordinator agent. Use this when the task is complete."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["task_status", "findings"],
            "properties": {
                "task_status": {
                    "type": "string",
                    "enum": ["completed", "partially_completed", "failed"],
                    "description": "Status of the assigned task"
                },
                "findings": {
                    "type": "string",
                    "description": "Key findings, results, or data discovered during the task"
                },
                "recommendations": {
                    "type": "string",
                    "description": "Recommended next steps"
                },
                "confidence": {
                    "type": "number",
                    "minimum": 0,
                    "maximum": 100,
                    "description": "Confidence in the findings (0-100)"
                },
                "additional_data": {
                    "type": "object",
                    "additionalProperties": true,
                    "description": "Structured data to pass back to the coordinator"
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let mut report: ReportArgs = parse(args)?;
        report.confidence = report.confidence.clamp(0.0, 100.0);
        let text = format_report(&report);

        let mut metadata = Map::new();
        metadata.insert("report_type".into(), json!("task_completion"));
        metadata.insert("task_status".into(), json!(report.task_status.to_string()));
        metadata.insert("confidence".into(), json!(report.confidence));
        metadata.insert(
            "structured_data".into(),
            json!({
                "task_status": report.task_status.to_string(),
                "findings": report.findings,
                "recommendations": report.recommendations,
                "confidence": report.confidence,
                "additional_data": report.additional_data,
            }),
        );
        let entry = NewEntry::new(
            &self.agent_name,
            &self.task_id,
            REPORT_CATEGORY,
            format!("Task Report - Status: {}", report.task_status),
            text.clone(),
        )
        .with_tags(["report".to_string(), "task_completion".to_string(), report.task_status.to_string()])
        .with_metadata(metadata);

        match self.memory.store(entry) {
            Ok(id) => info!(agent = %self.agent_name, entry_id = %id, status = %report.task_status, "task report stored"),
            Err(e) => warn!(agent = %self.agent_name, error = %e, "failed to store task report"),
        }
        Ok(format!("Task report submitted and stored in shared memory.\n{text}"))
    }
}

/// Lets a subagent leave a question for the coordinator.
pub struct RequestGuidanceTool {
    memory: Arc<SharedMemory>,
    agent_name: String,
    task_id: String,
}

impl RequestGuidanceTool {
    pub fn new(memory: Arc<SharedMemory>, agent_name: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            memory,
            agent_name: agent_name.into(),
            task_id: task_id.into(),
        }
    }
}

#[async_trait]
impl Tool for RequestGuidanceTool {
    fn name(&self) -> &str {
        "request_guidance"
    }

    fn description(&self) -> &str {
        "Request guidance, clarification, or additional instructions from the coordinator agent."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["question", "context"],
            "properties": {
                "question": {
                    "type": "string",
                    "description": "The specific question or issue that needs clarification"
                },
                "context": {
                    "type": "string",
                    "description": "What has been tried so far and why guidance is needed"
                },
                "urgency": {
                    "type": "string",
                    "enum": ["low", "medium", "high"],
                    "description": "Urgency of the request"
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let request: GuidanceArgs = parse(args)?;
        let urgency = request.urgency.to_string().to_uppercase();
        let text = format!(
            "GUIDANCE REQUEST ({urgency} PRIORITY)\n{}\n\nQUESTION:\n{}\n\nCONTEXT:\n{}\n\n\
             Please provide guidance on how to proceed.",
            "=".repeat(37),
            request.question,
            request.context,
        );

        let mut metadata = Map::new();
        metadata.insert("request_type".into(), json!("guidance"));
        metadata.insert("urgency".into(), json!(request.urgency.to_string()));
        metadata.insert("question".into(), json!(request.question));
        metadata.insert("context".into(), json!(request.context));
        let entry = NewEntry::new(
            &self.agent_name,
            &self.task_id,
            REPORT_CATEGORY,
            format!("Guidance Request - {urgency} Priority"),
            text.clone(),
        )
        .with_tags([
            "guidance_request".to_string(),
            request.urgency.to_string(),
            REPORT_CATEGORY.to_string(),
        ])
        .with_metadata(metadata);

        if let Err(e) = self.memory.store(entry) {
            warn!(agent = %self.agent_name, error = %e, "failed to store guidance request");
        }
        Ok(format!("Guidance request submitted and stored in shared memory.\n{text}"))
    }
}
