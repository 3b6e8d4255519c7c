//! Workflow graphs built from a process task DAG.

use super::errors::{WorkflowError, WorkflowResult};
use super::types::TaskType;
use crate::models::{DataStageType, ProcessModel, TaskTypes, WorkflowKind};
use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowNode {
    pub task_id: String,
    pub task_type: TaskType,
}

/// Tasks of one workflow and the order constraints between them
///
/// An edge `a -> b` means `b` starts only after `a` succeeded.
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    workflow_id: String,
    process_id: String,
    kind: WorkflowKind,
    graph: DiGraph<WorkflowNode, ()>,
    index: HashMap<String, NodeIndex>,
}

impl WorkflowDefinition {
    pub fn new(process_id: &str, kind: WorkflowKind) -> Self {
        let label = match kind {
            WorkflowKind::Pre => "PRE",
            WorkflowKind::Post => "POST",
            WorkflowKind::Cancel => "CANCEL",
        };
        Self {
            workflow_id: format!("{process_id}-{label}-{}", Uuid::new_v4()),
            process_id: process_id.to_string(),
            kind,
            graph: DiGraph::new(),
            index: HashMap::new(),
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    pub fn kind(&self) -> WorkflowKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Add a node; an existing task id keeps its original node
    pub fn add_task(&mut self, task_id: impl Into<String>, task_type: TaskType) -> NodeIndex {
        let task_id = task_id.into();
        if let Some(&index) = self.index.get(&task_id) {
            return index;
        }
        let index = self.graph.add_node(WorkflowNode {
            task_id: task_id.clone(),
            task_type,
        });
        self.index.insert(task_id, index);
        index
    }

    pub fn add_dependency(&mut self, from: &str, to: &str) -> WorkflowResult<()> {
        let from_index = *self
            .index
            .get(from)
            .ok_or_else(|| WorkflowError::UnknownNode(from.to_string()))?;
        let to_index = *self
            .index
            .get(to)
            .ok_or_else(|| WorkflowError::UnknownNode(to.to_string()))?;

        let edge = self.graph.add_edge(from_index, to_index, ());
        if is_cyclic_directed(&self.graph) {
            self.graph.remove_edge(edge);
            return Err(WorkflowError::CycleDetected {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }

    pub fn node(&self, task_id: &str) -> Option<&WorkflowNode> {
        self.index
            .get(task_id)
            .and_then(|&index| self.graph.node_weight(index))
    }

    pub fn dependencies(&self, task_id: &str) -> Vec<&WorkflowNode> {
        self.index
            .get(task_id)
            .map(|&index| {
                self.graph
                    .neighbors_directed(index, Direction::Incoming)
                    .filter_map(|neighbor| self.graph.node_weight(neighbor))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Nodes grouped so that every node's dependencies sit in earlier layers
    pub fn layers(&self) -> WorkflowResult<Vec<Vec<WorkflowNode>>> {
        let order = toposort(&self.graph, None).map_err(|cycle| {
            let node = &self.graph[cycle.node_id()];
            WorkflowError::CycleDetected {
                from: node.task_id.clone(),
                to: node.task_id.clone(),
            }
        })?;

        let mut depth: HashMap<NodeIndex, usize> = HashMap::new();
        let mut layers: Vec<Vec<WorkflowNode>> = Vec::new();
        for index in order {
            let level = self
                .graph
                .neighbors_directed(index, Direction::Incoming)
                .filter_map(|parent| depth.get(&parent))
                .map(|parent_depth| parent_depth + 1)
                .max()
                .unwrap_or(0);
            depth.insert(index, level);
            if layers.len() <= level {
                layers.resize_with(level + 1, Vec::new);
            }
            layers[level].push(self.graph[index].clone());
        }
        for layer in &mut layers {
            layer.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        }
        Ok(layers)
    }

    /// Serial chain builder that lets consecutive staging nodes run side by side
    fn append(
        &mut self,
        frontier: &mut Vec<String>,
        group: &mut Vec<String>,
        task_id: String,
        task_type: TaskType,
        parallel: bool,
    ) -> WorkflowResult<()> {
        if !parallel && !group.is_empty() {
            *frontier = std::mem::take(group);
        }
        self.add_task(task_id.clone(), task_type);
        for dependency in frontier.iter() {
            self.add_dependency(dependency, &task_id)?;
        }
        if parallel {
            group.push(task_id);
        } else {
            *frontier = vec![task_id];
        }
        Ok(())
    }

    /// Environment setup, input staging and job submission from the process DAG
    pub fn pre_workflow(process: &ProcessModel) -> WorkflowResult<Self> {
        let mut definition = Self::new(&process.process_id, WorkflowKind::Pre);
        let mut frontier = Vec::new();
        let mut group = Vec::new();

        for task in process.ordered_tasks() {
            let (task_type, parallel) = match (task.task_type, task.stage_type()) {
                (TaskTypes::EnvSetup, _) => (TaskType::EnvSetup, false),
                (TaskTypes::DataStaging, Some(DataStageType::Input)) => (TaskType::InputDataStaging, true),
                (TaskTypes::JobSubmission, _) => (TaskType::JobSubmission, false),
                _ => continue,
            };
            definition.append(&mut frontier, &mut group, task.task_id.clone(), task_type, parallel)?;
            if task_type == TaskType::JobSubmission {
                break;
            }
        }

        if definition.is_empty() {
            return Err(WorkflowError::InvalidDefinition(format!(
                "process {} has no pre-processing tasks",
                process.process_id
            )));
        }
        Ok(definition)
    }

    /// Job verification, output staging, completion and parser triggering
    pub fn post_workflow(process: &ProcessModel) -> WorkflowResult<Self> {
        let mut definition = Self::new(&process.process_id, WorkflowKind::Post);
        let mut frontier = Vec::new();
        let mut group = Vec::new();

        definition.append(
            &mut frontier,
            &mut group,
            format!("{}-{}", TaskType::JobVerification, Uuid::new_v4()),
            TaskType::JobVerification,
            false,
        )?;

        let mut after_submission = false;
        for task in process.ordered_tasks() {
            if task.task_type == TaskTypes::JobSubmission {
                after_submission = true;
                continue;
            }
            if !after_submission || task.task_type != TaskTypes::DataStaging {
                continue;
            }
            let task_type = match task.stage_type() {
                Some(DataStageType::Output) => TaskType::OutputDataStaging,
                Some(DataStageType::ArchiveOutput) => TaskType::Archive,
                _ => continue,
            };
            definition.append(&mut frontier, &mut group, task.task_id.clone(), task_type, true)?;
        }

        definition.append(
            &mut frontier,
            &mut group,
            format!("{}-{}", TaskType::Completing, Uuid::new_v4()),
            TaskType::Completing,
            false,
        )?;
        definition.append(
            &mut frontier,
            &mut group,
            TaskType::ParsingTriggering.to_string(),
            TaskType::ParsingTriggering,
            false,
        )?;
        Ok(definition)
    }

    /// Stop other workflows, kill the remote job, mark the process canceled
    pub fn cancel_workflow(process: &ProcessModel) -> WorkflowResult<Self> {
        let mut definition = Self::new(&process.process_id, WorkflowKind::Cancel);
        let mut frontier = Vec::new();
        let mut group = Vec::new();
        for task_type in [
            TaskType::WorkflowCancellation,
            TaskType::RemoteJobCancellation,
            TaskType::CancelCompleting,
        ] {
            definition.append(
                &mut frontier,
                &mut group,
                format!("{task_type}-{}", Uuid::new_v4()),
                task_type,
                false,
            )?;
        }
        Ok(definition)
    }
}
