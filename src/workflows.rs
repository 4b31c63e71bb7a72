//! Workflow catalog.
//!
//! Server-side registry of the workflows the studio exposes. Each entry
//! binds a set of named input slots to an execution backend. Add new
//! workflows here to make them available through `POST /api/v1/run`.

/// Which upstream provider executes a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendBinding {
    ComfyDeploy,
    RunPod(RunPodEndpoint),
}

/// RunPod serverless endpoints are provisioned per workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPodEndpoint {
    Upscale,
    AiTalk,
}

/// Shape of a single input slot.
#[derive(Debug, Clone, Copy)]
pub enum SlotKind {
    Image,
    Text,
    Number { min: f64, max: f64 },
    Choice { options: &'static [&'static str] },
}

#[derive(Debug, Clone, Copy)]
pub struct SlotSpec {
    pub name: &'static str,
    pub kind: SlotKind,
    pub required: bool,
    /// Applied when the slot is optional and absent from the submission.
    pub default: Option<&'static str>,
}

#[derive(Debug, Clone, Copy)]
pub struct WorkflowSpec {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub backend: BackendBinding,
    pub slots: &'static [SlotSpec],
}

const SIZE_PRESETS: &[&str] = &[
    "2048x2048 (1:1)",
    "2304x1728 (4:3)",
    "1728x2304 (3:4)",
    "2560x1440 (16:9)",
    "1440x2560 (9:16)",
    "2496x1664 (3:2)",
    "1664x2496 (2:3)",
    "3024x1296 (21:9)",
    "4096x4096 (1:1)",
    "Custom",
];

const SCALE_OPTIONS: &[&str] = &["2", "4", "8"];

const WORKFLOWS: &[WorkflowSpec] = &[
    WorkflowSpec {
        id: "model-product-fusion",
        name: "AI Fashion Commerce",
        description: "Composite a product onto a model shot for e-commerce production.",
        backend: BackendBinding::ComfyDeploy,
        slots: &[
            SlotSpec {
                name: "model_image",
                kind: SlotKind::Image,
                required: true,
                default: None,
            },
            SlotSpec {
                name: "product_image",
                kind: SlotKind::Image,
                required: true,
                default: None,
            },
            SlotSpec {
                name: "size_preset",
                kind: SlotKind::Choice {
                    options: SIZE_PRESETS,
                },
                required: false,
                default: Some("2048x2048 (1:1)"),
            },
            SlotSpec {
                name: "pose_selection",
                kind: SlotKind::Text,
                required: false,
                default: None,
            },
            SlotSpec {
                name: "background_selection",
                kind: SlotKind::Text,
                required: false,
                default: None,
            },
        ],
    },
    WorkflowSpec {
        id: "vellum-upscale",
        name: "Vellum 2.0 Upscale",
        description: "Detail-preserving image upscaling with adjustable model strength.",
        backend: BackendBinding::RunPod(RunPodEndpoint::Upscale),
        slots: &[
            SlotSpec {
                name: "input_image",
                kind: SlotKind::Image,
                required: true,
                default: None,
            },
            SlotSpec {
                name: "strength_model",
                kind: SlotKind::Number { min: 0.0, max: 1.0 },
                required: false,
                default: Some("0.5"),
            },
            SlotSpec {
                name: "scale_by",
                kind: SlotKind::Choice {
                    options: SCALE_OPTIONS,
                },
                required: true,
                default: None,
            },
        ],
    },
    WorkflowSpec {
        id: "ai-talk",
        name: "AI Talk",
        description: "Animate a portrait into a talking-head video from a script.",
        backend: BackendBinding::RunPod(RunPodEndpoint::AiTalk),
        slots: &[
            SlotSpec {
                name: "input_image",
                kind: SlotKind::Image,
                required: true,
                default: None,
            },
            SlotSpec {
                name: "speech_text",
                kind: SlotKind::Text,
                required: true,
                default: None,
            },
            SlotSpec {
                name: "voice_id",
                kind: SlotKind::Text,
                required: false,
                default: Some("gdMFOufuI36UmxNKJhtv"),
            },
        ],
    },
];

pub fn catalog() -> &'static [WorkflowSpec] {
    WORKFLOWS
}

pub fn find(id: &str) -> Option<&'static WorkflowSpec> {
    WORKFLOWS.iter().find(|w| w.id == id)
}

pub fn default_workflow() -> &'static WorkflowSpec {
    &WORKFLOWS[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_ids_are_unique() {
        let mut ids: Vec<_> = catalog().iter().map(|w| w.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), catalog().len());
    }

    #[test]
    fn default_workflow_is_listed() {
        assert!(find(default_workflow().id).is_some());
    }

    #[test]
    fn required_slots_have_no_default() {
        for workflow in catalog() {
            for slot in workflow.slots {
                if slot.required {
                    assert!(slot.default.is_none(), "{}/{}", workflow.id, slot.name);
                }
            }
        }
    }
}
