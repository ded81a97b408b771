// Built-in sample workflows

use crate::types::StepType;
use crate::workflow::{Step, Workflow};
use serde_json::json;

pub const DOCUMENT_PIPELINE: &str = "Document Processing Pipeline";
pub const IMAGE_PIPELINE: &str = "Image Analysis Pipeline";

/// Every sample workflow, freshly built with new ids
pub fn sample_workflows() -> Vec<Workflow> {
    vec![document_pipeline(), image_pipeline()]
}

/// Look up a sample by name, ignoring case
pub fn sample_workflow(name: &str) -> Option<Workflow> {
    sample_workflows()
        .into_iter()
        .find(|workflow| workflow.name.eq_ignore_ascii_case(name))
}

/// upload -> validate -> process -> output
pub fn document_pipeline() -> Workflow {
    let mut workflow = Workflow::new(
        DOCUMENT_PIPELINE,
        "Automated document upload, validation, and processing workflow",
    );

    workflow.add_step(
        Step::new("upload", "Upload Document", StepType::Input).with_config(json!({
            "input": {"required_fields": ["document_file", "document_type"]}
        })),
    );
    workflow.add_step(
        Step::new("validate", "Validate Format", StepType::Validation).with_config(json!({
            "rules": [
                {"field": "document_type", "condition": "equals", "value": "pdf"},
                {"field": "document_file", "condition": "not_empty"}
            ]
        })),
    );
    workflow.add_step(
        Step::new("process", "Process Document", StepType::Processing).with_config(json!({
            "operation": "document_processing",
            "processing_time": 3
        })),
    );
    workflow.add_step(
        Step::new("output", "Generate Output", StepType::Output).with_config(json!({
            "format": "json",
            "fields": ["processed_document", "document_type", "pages_processed"]
        })),
    );

    workflow.connect_steps("upload", "validate");
    workflow.connect_steps("validate", "process");
    workflow.connect_steps("process", "output");
    workflow.set_start_step("upload");
    workflow
}

/// img_upload -> img_analyze -> img_output
pub fn image_pipeline() -> Workflow {
    let mut workflow = Workflow::new(
        IMAGE_PIPELINE,
        "AI-powered image analysis and report generation workflow",
    );

    workflow.add_step(
        Step::new("img_upload", "Upload Image", StepType::Input).with_config(json!({
            "input": {"required_fields": ["image_file", "image_format"]}
        })),
    );
    workflow.add_step(
        Step::new("img_analyze", "Analyze Image", StepType::Processing).with_config(json!({
            "operation": "image_analysis",
            "processing_time": 2
        })),
    );
    workflow.add_step(
        Step::new("img_output", "Generate Report", StepType::Output).with_config(json!({
            "format": "pdf",
            "fields": ["analyzed_image", "analysis_result"]
        })),
    );

    workflow.connect_steps("img_upload", "img_analyze");
    workflow.connect_steps("img_analyze", "img_output");
    workflow.set_start_step("img_upload");
    workflow
}
