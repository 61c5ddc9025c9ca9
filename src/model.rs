use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::RemoteError;

pub type OfferingId = i64;
pub type InstructorId = i64;

/// Identifier of one allocation run within a controller.
pub type RunId = u64;

/// Parameters for one optimizer run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub population_size: u32,
    pub generations: u32,
    pub crossover_probability: f64,
    pub mutation_probability: f64,
    /// Name of the target semester, e.g. "2024.1".
    pub semester: String,
}

impl RunConfig {
    /// Built-in defaults used when the backend cannot supply its own.
    pub fn builtin() -> Self {
        Self {
            population_size: 100,
            generations: 50,
            crossover_probability: 0.8,
            mutation_probability: 0.1,
            semester: String::new(),
        }
    }

    pub fn parameters(&self) -> OptimizerParameters {
        OptimizerParameters {
            population_size: self.population_size,
            generations: self.generations,
            crossover_probability: self.crossover_probability,
            mutation_probability: self.mutation_probability,
        }
    }
}

/// Genetic algorithm parameters as the backend names them on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizerParameters {
    #[serde(rename = "tamanho_populacao")]
    pub population_size: u32,
    #[serde(rename = "num_geracoes")]
    pub generations: u32,
    #[serde(rename = "probabilidade_crossover")]
    pub crossover_probability: f64,
    #[serde(rename = "probabilidade_mutacao")]
    pub mutation_probability: f64,
}

/// Default optimizer parameters advertised by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerDefaults {
    #[serde(flatten)]
    pub parameters: OptimizerParameters,
    #[serde(default)]
    pub elite_size: Option<u32>,
    #[serde(rename = "torneio_size", default)]
    pub tournament_size: Option<u32>,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Semester {
    pub id: i64,
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "ano")]
    pub year: i32,
    #[serde(rename = "periodo")]
    pub period: String,
    #[serde(rename = "data_inicio")]
    pub start_date: String,
    #[serde(rename = "data_fim")]
    pub end_date: String,
}

/// One instructor-to-offering pairing proposed by the optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedAssignment {
    #[serde(default)]
    pub idx: u32,
    #[serde(rename = "oferta_id")]
    pub offering_id: OfferingId,
    #[serde(rename = "professor_id")]
    pub instructor_id: InstructorId,
    #[serde(rename = "professor_nome", default)]
    pub instructor_name: String,
    #[serde(rename = "disciplina_nome", default)]
    pub course_name: String,
    #[serde(rename = "turma", default)]
    pub section: String,
    #[serde(rename = "carga_horaria", default)]
    pub course_hours: f64,
    #[serde(rename = "carga_maxima", default)]
    pub max_load: f64,
    #[serde(rename = "carga_alocada", default)]
    pub allocated_load: f64,
    #[serde(rename = "area_disciplina", default)]
    pub course_area: String,
    /// Whether the instructor covers the course's area.
    #[serde(rename = "tem_competencia", default)]
    pub compatible: bool,
    #[serde(rename = "nivel_professor", default)]
    pub instructor_level: i32,
    #[serde(rename = "nivel_esperado", default)]
    pub expected_level: i32,
    #[serde(rename = "titulacao", default)]
    pub degree: String,
    #[serde(rename = "modelo_contratacao", default)]
    pub contract: String,
    #[serde(rename = "match", default)]
    pub match_label: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProposedAllocation {
    #[serde(rename = "total_ofertas", default)]
    pub total_offerings: u32,
    #[serde(rename = "alocacoes", default)]
    pub assignments: Vec<ProposedAssignment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Penalties {
    #[serde(rename = "incompetencia", default)]
    pub incompetence: f64,
    #[serde(rename = "sobrecarga", default)]
    pub overload: f64,
    #[serde(rename = "desbalanceamento", default)]
    pub imbalance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct QualityMetrics {
    #[serde(rename = "fitness_total", default)]
    pub total_fitness: f64,
    #[serde(rename = "penalidades", default)]
    pub penalties: Penalties,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InstructorLoad {
    #[serde(rename = "professor")]
    pub instructor: String,
    #[serde(rename = "carga_alocada", default)]
    pub allocated: f64,
    #[serde(rename = "carga_maxima", default)]
    pub maximum: f64,
    #[serde(rename = "carga_livre", default)]
    pub free: f64,
    #[serde(rename = "percentual_utilizado", default)]
    pub utilisation_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProposalSummary {
    #[serde(rename = "ofertas_totais", default)]
    pub total_offerings: u32,
    #[serde(rename = "ofertas_com_match", default)]
    pub matched_offerings: u32,
    #[serde(rename = "ofertas_sem_match", default)]
    pub unmatched_offerings: u32,
    #[serde(rename = "percentual_compatibilidade", default)]
    pub compatibility_pct: f64,
    #[serde(rename = "professores_utilizados", default)]
    pub instructors_used: u32,
    #[serde(rename = "total_professores", default)]
    pub total_instructors: u32,
    #[serde(rename = "distribuicao_carga", default)]
    pub load_distribution: Vec<InstructorLoad>,
    #[serde(rename = "fitness_total", default)]
    pub total_fitness: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Feasibility {
    #[serde(rename = "viavel", default)]
    pub feasible: bool,
    #[serde(rename = "problemas", default)]
    pub problems: Vec<String>,
}

/// Per-generation fitness statistics recorded by the optimizer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FitnessEvolution {
    #[serde(rename = "geracoes", default)]
    pub generations: Vec<u32>,
    #[serde(rename = "media", default)]
    pub mean: Vec<f64>,
    #[serde(rename = "minimo", default)]
    pub min: Vec<f64>,
    #[serde(rename = "maximo", default)]
    pub max: Vec<f64>,
    #[serde(rename = "desvio", default)]
    pub std_dev: Vec<f64>,
}

/// Immutable output of one successful optimizer run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationProposal {
    #[serde(rename = "semestre")]
    pub semester: String,
    #[serde(rename = "tempo_execucao_segundos", default)]
    pub elapsed_secs: f64,
    #[serde(rename = "parametros_utilizados")]
    pub parameters: OptimizerParameters,
    #[serde(rename = "proposta_alocacao", default)]
    pub allocation: ProposedAllocation,
    #[serde(rename = "qualidade", default)]
    pub quality: QualityMetrics,
    #[serde(rename = "resumo", default)]
    pub summary: ProposalSummary,
    #[serde(rename = "viabilidade", default)]
    pub feasibility: Feasibility,
    #[serde(rename = "evolucao_fitness", default)]
    pub fitness_evolution: FitnessEvolution,
}

impl AllocationProposal {
    pub fn assignments(&self) -> &[ProposedAssignment] {
        &self.allocation.assignments
    }

    pub fn assignment(&self, offering_id: OfferingId) -> Option<&ProposedAssignment> {
        self.allocation
            .assignments
            .iter()
            .find(|a| a.offering_id == offering_id)
    }
}

/// Payload of a persist call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistAssignment {
    #[serde(rename = "oferta_id")]
    pub offering_id: OfferingId,
    #[serde(rename = "professor_id")]
    pub instructor_id: InstructorId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveStatus {
    Unsaved,
    Saving,
    Saved,
}

/// Progress fields published while a run is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunProgress {
    pub overall_pct: f64,
    pub stage_label: String,
    pub stage_pct: f64,
    pub estimated_generation: u32,
}

impl RunProgress {
    pub fn zero() -> Self {
        Self {
            overall_pct: 0.0,
            stage_label: String::new(),
            stage_pct: 0.0,
            estimated_generation: 0,
        }
    }

    pub fn completed(generations: u32) -> Self {
        Self {
            overall_pct: 100.0,
            stage_label: "Completed".into(),
            stage_pct: 100.0,
            estimated_generation: generations,
        }
    }

    /// Map an animation tick onto the run's generation count.
    pub fn from_tick(tick: &StageTick, generations: u32) -> Self {
        let overall = tick.overall_pct.clamp(0.0, 100.0);
        let estimated = ((overall / 100.0) * generations as f64).floor() as u32;
        Self {
            overall_pct: overall,
            stage_label: tick.stage_label.clone(),
            stage_pct: tick.stage_pct.clamp(0.0, 100.0),
            estimated_generation: estimated.min(generations),
        }
    }
}

/// Observable lifecycle of a run, owned by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum RunState {
    Idle,
    Running {
        run_id: RunId,
        progress: RunProgress,
    },
    Succeeded {
        run_id: RunId,
        progress: RunProgress,
        proposal: Arc<AllocationProposal>,
    },
    Failed {
        run_id: RunId,
        error: RemoteError,
    },
}

impl RunState {
    pub fn is_running(&self) -> bool {
        matches!(self, RunState::Running { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Succeeded { .. } | RunState::Failed { .. })
    }

    pub fn run_id(&self) -> Option<RunId> {
        match self {
            RunState::Idle => None,
            RunState::Running { run_id, .. }
            | RunState::Succeeded { run_id, .. }
            | RunState::Failed { run_id, .. } => Some(*run_id),
        }
    }

    /// Overall progress; zero for idle and failed runs.
    pub fn overall_progress_pct(&self) -> f64 {
        match self {
            RunState::Running { progress, .. } | RunState::Succeeded { progress, .. } => {
                progress.overall_pct
            }
            RunState::Idle | RunState::Failed { .. } => 0.0,
        }
    }

    pub fn progress(&self) -> Option<&RunProgress> {
        match self {
            RunState::Running { progress, .. } | RunState::Succeeded { progress, .. } => {
                Some(progress)
            }
            RunState::Idle | RunState::Failed { .. } => None,
        }
    }

    pub fn proposal(&self) -> Option<&Arc<AllocationProposal>> {
        match self {
            RunState::Succeeded { proposal, .. } => Some(proposal),
            _ => None,
        }
    }
}

/// One step of the synthetic progress animation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTick {
    pub overall_pct: f64,
    pub stage_index: usize,
    pub stage_label: String,
    pub stage_pct: f64,
}

/// Events emitted by the run engine and consumed by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Stage(StageTick),
    /// The optimizer answered before the animation finished; its result is held back.
    ResultBuffered,
    /// The animation finished and the optimizer has not answered yet.
    AwaitingOptimizer,
}
