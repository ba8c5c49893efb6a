//! 应用层服务测试
//!
//! 覆盖登记表和消息存储的主要用例，存储使用内存实现或 mockall 生成的桩。

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use domain::{Message, MessageKind, RepositoryError, BROADCAST_TARGET};

use crate::{
    announcer::StatusAnnouncer,
    clock::{Clock, ManualClock},
    error::ApplicationError,
    repository::{
        memory::{InMemoryMessageRepository, InMemoryParticipantRepository},
        MessageRepository, MockMessageRepository, MockParticipantRepository, ParticipantRepository,
    },
    services::{
        MessageService, MessageServiceDependencies, ParticipantService,
        ParticipantServiceDependencies,
    },
    validation::{RegisterParticipantRequest, SendMessageRequest},
};

struct Harness {
    clock: Arc<ManualClock>,
    participant_repository: Arc<InMemoryParticipantRepository>,
    message_repository: Arc<InMemoryMessageRepository>,
    participants: Arc<ParticipantService>,
    messages: MessageService,
}

fn build_services(
    participant_repository: Arc<dyn ParticipantRepository>,
    message_repository: Arc<dyn MessageRepository>,
    clock: Arc<dyn Clock>,
) -> (Arc<ParticipantService>, MessageService) {
    let announcer = Arc::new(StatusAnnouncer::new(message_repository.clone(), clock.clone()));
    let participants = Arc::new(ParticipantService::new(ParticipantServiceDependencies {
        participant_repository,
        announcer,
        clock: clock.clone(),
    }));
    let messages = MessageService::new(MessageServiceDependencies {
        message_repository,
        participants: participants.clone(),
        clock,
    });
    (participants, messages)
}

impl Harness {
    fn new() -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        ));
        let participant_repository = Arc::new(InMemoryParticipantRepository::new());
        let message_repository = Arc::new(InMemoryMessageRepository::new());
        let (participants, messages) = build_services(
            participant_repository.clone(),
            message_repository.clone(),
            clock.clone(),
        );
        Self {
            clock,
            participant_repository,
            message_repository,
            participants,
            messages,
        }
    }

    async fn register(&self, name: &str) -> Result<domain::Participant, ApplicationError> {
        self.participants
            .register(RegisterParticipantRequest {
                name: Some(name.to_owned()),
            })
            .await
    }

    async fn send(&self, actor: &str, to: &str, text: &str, kind: &str) -> Message {
        self.messages
            .create(Some(actor), send_request(to, text, kind))
            .await
            .expect("send message")
    }

    /// 进入房间的通知在后台任务里写入，等它落库
    async fn wait_for_broadcasts(&self, count: usize) -> Vec<Message> {
        for _ in 0..100 {
            let messages = self.message_repository.list_visible(None).await.unwrap();
            if messages.len() >= count {
                return messages;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected at least {count} broadcast messages");
    }
}

fn send_request(to: &str, text: &str, kind: &str) -> SendMessageRequest {
    SendMessageRequest {
        to: Some(to.to_owned()),
        text: Some(text.to_owned()),
        kind: Some(kind.to_owned()),
    }
}

#[tokio::test]
async fn register_creates_participant_and_join_announcement() {
    let harness = Harness::new();

    let participant = harness.register("  <b>Ana</b> ").await.unwrap();
    assert_eq!(participant.name.as_str(), "Ana");
    assert_eq!(participant.last_seen, harness.clock.now());

    let messages = harness.wait_for_broadcasts(1).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].from.as_str(), "Ana");
    assert_eq!(messages[0].to, BROADCAST_TARGET);
    assert_eq!(messages[0].kind, MessageKind::Status);
    assert_eq!(messages[0].text, "entered the room");
}

#[tokio::test]
async fn duplicate_name_conflicts() {
    let harness = Harness::new();
    harness.register("Ana").await.unwrap();

    let err = harness.register("Ana").await.unwrap_err();
    assert!(matches!(err, ApplicationError::Conflict(_)));
    assert_eq!(harness.participants.list().await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registration_admits_exactly_one() {
    let harness = Arc::new(Harness::new());

    let attempts: Vec<_> = (0..8)
        .map(|_| {
            let harness = harness.clone();
            tokio::spawn(async move { harness.register("Ana").await })
        })
        .collect();
    let results: Vec<_> = futures::future::join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.expect("task"))
        .collect();

    let successes = results.iter().filter(|result| result.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|result| matches!(result, Err(ApplicationError::Conflict(_))))
        .count();
    assert_eq!(successes, 1);
    assert_eq!(conflicts, 7);
}

#[tokio::test]
async fn storage_uniqueness_is_authoritative_when_precheck_passes() {
    let mut participant_repository = MockParticipantRepository::new();
    participant_repository
        .expect_find_by_name()
        .returning(|_| Ok(None));
    participant_repository
        .expect_insert()
        .times(1)
        .returning(|_| Err(RepositoryError::Conflict));
    let mut message_repository = MockMessageRepository::new();
    message_repository.expect_insert().never();

    let (participants, _) = build_services(
        Arc::new(participant_repository),
        Arc::new(message_repository),
        Arc::new(ManualClock::new(Utc::now())),
    );

    let err = participants
        .register(RegisterParticipantRequest {
            name: Some("Ana".into()),
        })
        .await
        .unwrap_err();
    assert_eq!(err, ApplicationError::Conflict("name Ana is already in use".into()));
}

#[tokio::test]
async fn registration_survives_failed_announcement() {
    let participant_repository = Arc::new(InMemoryParticipantRepository::new());
    let mut message_repository = MockMessageRepository::new();
    message_repository
        .expect_insert()
        .returning(|_| Err(RepositoryError::storage("unavailable")));

    let (participants, _) = build_services(
        participant_repository.clone(),
        Arc::new(message_repository),
        Arc::new(ManualClock::new(Utc::now())),
    );

    let participant = participants
        .register(RegisterParticipantRequest {
            name: Some("Ana".into()),
        })
        .await
        .unwrap();
    tokio::task::yield_now().await;

    assert!(participants.is_present(&participant.name).await.unwrap());
}

#[tokio::test]
async fn register_rejects_blank_names() {
    let harness = Harness::new();
    for name in [None, Some("   "), Some("<i></i>")] {
        let err = harness
            .participants
            .register(RegisterParticipantRequest {
                name: name.map(str::to_owned),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::InvalidArgument(_)));
    }
}

#[tokio::test]
async fn heartbeat_refreshes_known_participants_only() {
    let harness = Harness::new();
    let registered = harness.register("Ana").await.unwrap();

    harness.clock.advance(Duration::seconds(3));
    let seen_at = harness.participants.heartbeat(Some("Ana")).await.unwrap();
    assert!(seen_at > registered.last_seen);

    // 时钟未推进时仍然严格递增
    let again = harness.participants.heartbeat(Some("Ana")).await.unwrap();
    assert!(again > seen_at);

    let stored = harness
        .participant_repository
        .find_by_name(&registered.name)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.last_seen, again);

    for unknown in [None, Some(""), Some("Bob")] {
        let err = harness.participants.heartbeat(unknown).await.unwrap_err();
        assert!(matches!(err, ApplicationError::NotFound(_)));
    }
}

#[tokio::test]
async fn send_requires_registered_actor() {
    let harness = Harness::new();
    harness.register("Ana").await.unwrap();

    let err = harness
        .messages
        .create(None, send_request(BROADCAST_TARGET, "hi", "message"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApplicationError::Unauthenticated(_)));

    let err = harness
        .messages
        .create(Some("Bob"), send_request(BROADCAST_TARGET, "hi", "message"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ApplicationError::Unauthenticated("user is not registered".into())
    );
}

#[tokio::test]
async fn send_rejects_status_and_malformed_payloads() {
    let harness = Harness::new();
    harness.register("Ana").await.unwrap();

    for request in [
        send_request(BROADCAST_TARGET, "hi", "status"),
        send_request(BROADCAST_TARGET, "hi", "shout"),
        send_request(BROADCAST_TARGET, "<p></p>", "message"),
        SendMessageRequest {
            to: None,
            text: Some("hi".into()),
            kind: Some("message".into()),
        },
    ] {
        let err = harness
            .messages
            .create(Some("Ana"), request)
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::InvalidArgument(_)), "{err:?}");
    }
}

#[tokio::test]
async fn created_message_round_trips_for_author() {
    let harness = Harness::new();
    harness.register("Ana").await.unwrap();
    harness.wait_for_broadcasts(1).await;

    let sent = harness
        .send("Ana", "Bob", "<em>psst</em>", "private_message")
        .await;
    assert_eq!(sent.text, "psst");

    let listed = harness.messages.list(Some("Ana"), None).await.unwrap();
    let found = listed
        .iter()
        .find(|message| message.id == sent.id)
        .expect("author sees own message");
    assert_eq!(found.to, "Bob");
    assert_eq!(found.text, "psst");
    assert_eq!(found.kind, MessageKind::PrivateMessage);
    assert_eq!(found.from.as_str(), "Ana");
}

#[tokio::test]
async fn listing_filters_by_visibility() {
    let harness = Harness::new();
    harness.register("Ana").await.unwrap();
    harness.register("Bob").await.unwrap();
    harness.register("Carla").await.unwrap();
    harness.wait_for_broadcasts(3).await;

    let public = harness.send("Ana", BROADCAST_TARGET, "hello all", "message").await;
    let private = harness.send("Ana", "Bob", "hi bob", "private_message").await;

    let ids = |messages: Vec<Message>| messages.into_iter().map(|m| m.id).collect::<Vec<_>>();

    let for_bob = ids(harness.messages.list(Some("Bob"), None).await.unwrap());
    assert!(for_bob.contains(&public.id));
    assert!(for_bob.contains(&private.id));

    let for_carla = ids(harness.messages.list(Some("Carla"), None).await.unwrap());
    assert!(for_carla.contains(&public.id));
    assert!(!for_carla.contains(&private.id));

    // 未注册的查看者和匿名查看者都只看到广播
    let for_stranger = harness.messages.list(Some("Zed"), None).await.unwrap();
    assert!(for_stranger.iter().all(Message::is_broadcast));
    let anonymous = harness.messages.list(None, None).await.unwrap();
    assert!(anonymous.iter().all(Message::is_broadcast));
    assert_eq!(anonymous.len(), 4);
}

#[tokio::test]
async fn limit_takes_leading_items_in_insertion_order() {
    let harness = Harness::new();
    harness.register("Ana").await.unwrap();
    harness.wait_for_broadcasts(1).await;
    for text in ["one", "two", "three"] {
        harness.send("Ana", BROADCAST_TARGET, text, "message").await;
    }

    let limited = harness.messages.list(Some("Ana"), Some("2")).await.unwrap();
    let texts: Vec<_> = limited.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["entered the room", "one"]);

    let err = harness
        .messages
        .list(Some("Ana"), Some("0"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApplicationError::InvalidArgument(_)));
}

#[tokio::test]
async fn only_author_may_edit() {
    let harness = Harness::new();
    harness.register("Ana").await.unwrap();
    harness.register("Bob").await.unwrap();
    let sent = harness.send("Ana", BROADCAST_TARGET, "hi", "message").await;
    let id = sent.id.to_string();

    // 非作者即使载荷非法也得到 Forbidden
    let err = harness
        .messages
        .edit(&id, Some("Bob"), send_request("", "", "status"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApplicationError::Forbidden(_)));

    let err = harness
        .messages
        .edit(&id, Some("Ana"), send_request(BROADCAST_TARGET, "hi", "status"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApplicationError::InvalidArgument(_)));

    harness.clock.advance(Duration::seconds(1));
    let edited = harness
        .messages
        .edit(&id, Some("Ana"), send_request("Bob", "hello bob", "private_message"))
        .await
        .unwrap();
    assert_eq!(edited.id, sent.id);
    assert_eq!(edited.from.as_str(), "Ana");
    assert!(edited.created_at > sent.created_at);

    let for_bob = harness.messages.list(Some("Bob"), None).await.unwrap();
    let stored = for_bob.iter().find(|m| m.id == sent.id).unwrap();
    assert_eq!(stored.text, "hello bob");
    assert_eq!(stored.kind, MessageKind::PrivateMessage);
}

#[tokio::test]
async fn edit_and_delete_unknown_messages_are_not_found() {
    let harness = Harness::new();
    let missing = uuid::Uuid::new_v4().to_string();
    for id in [missing.as_str(), "nope"] {
        let err = harness
            .messages
            .edit(id, Some("Ana"), send_request(BROADCAST_TARGET, "x", "message"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::NotFound(_)));

        let err = harness.messages.delete(id, Some("Ana")).await.unwrap_err();
        assert!(matches!(err, ApplicationError::NotFound(_)));
    }
}

#[tokio::test]
async fn only_author_may_delete() {
    let harness = Harness::new();
    harness.register("Ana").await.unwrap();
    let sent = harness.send("Ana", BROADCAST_TARGET, "bye", "message").await;
    let id = sent.id.to_string();

    let err = harness.messages.delete(&id, None).await.unwrap_err();
    assert!(matches!(err, ApplicationError::Unauthenticated(_)));

    let err = harness.messages.delete(&id, Some("Bob")).await.unwrap_err();
    assert!(matches!(err, ApplicationError::Forbidden(_)));

    harness.messages.delete(&id, Some("Ana")).await.unwrap();
    assert!(harness
        .message_repository
        .find_by_id(sent.id)
        .await
        .unwrap()
        .is_none());

    let err = harness.messages.delete(&id, Some("Ana")).await.unwrap_err();
    assert!(matches!(err, ApplicationError::NotFound(_)));
}

#[tokio::test]
async fn storage_failures_surface_as_internal() {
    let mut message_repository = MockMessageRepository::new();
    message_repository
        .expect_list_visible()
        .returning(|_| Err(RepositoryError::storage("connection refused")));

    let (_, messages) = build_services(
        Arc::new(InMemoryParticipantRepository::new()),
        Arc::new(message_repository),
        Arc::new(ManualClock::new(Utc::now())),
    );

    let err = messages.list(Some("Ana"), None).await.unwrap_err();
    assert_eq!(err, ApplicationError::Internal("connection refused".into()));
}
