use offering_allocator::api::{HttpSchedulerApi, SchedulerApi};
use offering_allocator::error::{PersistError, RemoteError};
use offering_allocator::model::{PersistAssignment, RunConfig};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn api(server: &MockServer) -> HttpSchedulerApi {
    // No trailing slash: endpoints must still resolve under the base path.
    HttpSchedulerApi::new(&format!("{}/backend", server.uri()), Duration::from_secs(2)).unwrap()
}

fn run_config() -> RunConfig {
    RunConfig {
        population_size: 100,
        generations: 50,
        crossover_probability: 0.7,
        mutation_probability: 0.2,
        semester: "2024.1".into(),
    }
}

fn proposal_body() -> serde_json::Value {
    json!({
        "data": {
            "semestre": "2024.1",
            "tempo_execucao_segundos": 12.5,
            "parametros_utilizados": {
                "tamanho_populacao": 100,
                "num_geracoes": 50,
                "probabilidade_crossover": 0.7,
                "probabilidade_mutacao": 0.2
            },
            "proposta_alocacao": {
                "total_ofertas": 1,
                "alocacoes": [{
                    "idx": 0,
                    "oferta_id": 7,
                    "professor_id": 42,
                    "professor_nome": "Ada",
                    "disciplina_nome": "Compilers",
                    "turma": "A",
                    "carga_horaria": 4.0,
                    "carga_maxima": 16.0,
                    "carga_alocada": 4.0,
                    "area_disciplina": "Computing",
                    "tem_competencia": true,
                    "nivel_professor": 3,
                    "nivel_esperado": 2,
                    "titulacao": "PhD",
                    "modelo_contratacao": "full-time",
                    "match": "ok"
                }]
            },
            "qualidade": {
                "fitness_total": 0.91,
                "penalidades": { "incompetencia": 0.0, "sobrecarga": 1.5, "desbalanceamento": 0.2 }
            },
            "viabilidade": { "viavel": true, "problemas": [] }
        },
        "message": "ok",
        "status": 200
    })
}

#[tokio::test]
async fn fetches_default_config() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/backend/api/ag/config/defaults"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "tamanho_populacao": 120,
                "num_geracoes": 40,
                "probabilidade_crossover": 0.75,
                "probabilidade_mutacao": 0.05,
                "elite_size": 2,
                "torneio_size": 3,
                "seed": null
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let defaults = api(&server).await.fetch_default_config().await.unwrap();

    assert_eq!(defaults.parameters.population_size, 120);
    assert_eq!(defaults.parameters.generations, 40);
    assert_eq!(defaults.tournament_size, Some(3));
    assert_eq!(defaults.seed, None);
}

#[tokio::test]
async fn unavailable_defaults_are_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/backend/api/ag/config/defaults"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = api(&server).await.fetch_default_config().await.unwrap_err();

    assert!(err.0.starts_with("503"), "{err}");
}

#[tokio::test]
async fn lists_semesters_with_paging() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/backend/api/semestres"))
        .and(query_param("page", "1"))
        .and(query_param("per_page", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{
                "id": 3,
                "nome": "2024.1",
                "ano": 2024,
                "periodo": "1",
                "data_inicio": "2024-02-01",
                "data_fim": "2024-07-01"
            }]
        })))
        .mount(&server)
        .await;

    let semesters = api(&server).await.fetch_semester_candidates().await.unwrap();

    assert_eq!(semesters.len(), 1);
    assert_eq!(semesters[0].name, "2024.1");
    assert_eq!(semesters[0].start_date, "2024-02-01");
}

#[tokio::test]
async fn executes_optimization_with_wire_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/backend/api/ag/executar"))
        .and(body_json(json!({
            "semestre_nome": "2024.1",
            "tamanho_populacao": 100,
            "num_geracoes": 50,
            "probabilidade_crossover": 0.7,
            "probabilidade_mutacao": 0.2
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(proposal_body()))
        .expect(1)
        .mount(&server)
        .await;

    let proposal = api(&server)
        .await
        .execute_optimization(&run_config())
        .await
        .unwrap();

    assert_eq!(proposal.semester, "2024.1");
    assert_eq!(proposal.quality.penalties.overload, 1.5);
    let a = proposal.assignment(7).unwrap();
    assert_eq!(a.instructor_id, 42);
    assert!(a.compatible);
}

#[tokio::test]
async fn optimizer_rejection_carries_the_backend_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/backend/api/ag/executar"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "message": "semester has no offerings" })),
        )
        .mount(&server)
        .await;

    let err = api(&server)
        .await
        .execute_optimization(&run_config())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        RemoteError::Status {
            status: 400,
            message: "semester has no offerings".into()
        }
    );
}

#[tokio::test]
async fn error_without_body_falls_back_to_status_reason() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/backend/api/ag/executar"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = api(&server)
        .await
        .execute_optimization(&run_config())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        RemoteError::Status {
            status: 500,
            message: "Internal Server Error".into()
        }
    );
}

#[tokio::test]
async fn malformed_proposal_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/backend/api/ag/executar"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "nope": 1 } })))
        .mount(&server)
        .await;

    let err = api(&server)
        .await
        .execute_optimization(&run_config())
        .await
        .unwrap_err();

    assert!(matches!(err, RemoteError::Decode(_)), "{err:?}");
}

#[tokio::test]
async fn persists_in_bulk_and_singly() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/backend/api/alocacoes/bulk"))
        .and(body_json(json!({
            "alocacoes": [
                { "oferta_id": 1, "professor_id": 10 },
                { "oferta_id": 2, "professor_id": 20 }
            ]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "data": null })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/backend/api/alocacoes"))
        .and(body_json(json!({ "oferta_id": 3, "professor_id": 30 })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let api = api(&server).await;
    api.persist_assignments(&[
        PersistAssignment {
            offering_id: 1,
            instructor_id: 10,
        },
        PersistAssignment {
            offering_id: 2,
            instructor_id: 20,
        },
    ])
    .await
    .unwrap();
    api.persist_assignment(&PersistAssignment {
        offering_id: 3,
        instructor_id: 30,
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn persist_rejection_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/backend/api/alocacoes"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({ "message": "offering already allocated" })),
        )
        .mount(&server)
        .await;

    let err = api(&server)
        .await
        .persist_assignment(&PersistAssignment {
            offering_id: 3,
            instructor_id: 30,
        })
        .await
        .unwrap_err();

    assert_eq!(
        err,
        PersistError::Status {
            status: 409,
            message: "offering already allocated".into()
        }
    );
}

#[tokio::test]
async fn unreachable_backend_is_a_transport_error() {
    // Nothing listens on the discard port.
    let api = HttpSchedulerApi::new("http://127.0.0.1:9/", Duration::from_millis(500)).unwrap();

    let err = api.execute_optimization(&run_config()).await.unwrap_err();

    assert!(matches!(err, RemoteError::Transport(_)), "{err:?}");
}
