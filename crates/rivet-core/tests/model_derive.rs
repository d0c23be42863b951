use chrono::{DateTime, TimeZone, Utc};
use rivet_core::{BaseModel, Model, TypeKey, Value, probe};
use rstest::rstest;

#[derive(Debug, Clone, PartialEq, Model)]
#[rivet(name = "tags")]
struct Tag {
	id: i64,
	label: String,
}

#[derive(Debug, Clone, PartialEq, Model)]
struct BlogPost {
	#[rivet(embed)]
	base: BaseModel,
	#[rivet(rename = "headline")]
	title: String,
	published_at: Option<i64>,
	#[rivet(relation)]
	tags: Vec<Tag>,
	#[rivet(skip)]
	views: u32,
	r#type: String,
}

fn post() -> BlogPost {
	let at: DateTime<Utc> = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
	BlogPost {
		base: BaseModel {
			id: uuid::Uuid::nil(),
			created_at: at,
			updated_at: at,
		},
		title: "Hello".into(),
		published_at: Some(3),
		tags: vec![Tag {
			id: 1,
			label: "rust".into(),
		}],
		views: 10,
		r#type: "article".into(),
	}
}

#[rstest]
fn test_derived_meta_lists_fields_in_order() {
	let meta = BlogPost::meta();
	assert_eq!(meta.name(), "blog_post");
	assert_eq!(
		meta.field_names().collect::<Vec<_>>(),
		[
			"id",
			"created_at",
			"updated_at",
			"headline",
			"published_at",
			"tags",
			"type"
		]
	);
	assert_eq!(meta.primary_key().unwrap().type_key(), TypeKey::of::<uuid::Uuid>());
	assert_eq!(Tag::meta().name(), "tags");
}

#[rstest]
fn test_probe_reports_capabilities_of_derived_fields() {
	let meta = BlogPost::meta();
	assert!(probe(meta, "created_at").unwrap().is_date_time());
	assert!(probe(meta, "published_at").unwrap().nullable_kind().is_some());
	assert!(probe(meta, "tags").unwrap().is_relation());
	assert!(!probe(meta, "headline").unwrap().is_relation());
	assert!(probe(meta, "views").is_none());
	assert!(probe(meta, "base").is_none());
}

#[rstest]
fn test_derived_conversions_round_trip() {
	let original = post();
	let value = original.clone().into_internal_value();

	assert_eq!(value.get("headline"), Some(&Value::from("Hello")));
	assert!(!value.contains_key("views"));
	assert!(matches!(value.get("tags"), Some(Value::List(items)) if items.len() == 1));

	let rebuilt = BlogPost::from_internal_value(&value).unwrap();
	assert_eq!(rebuilt.views, 0);
	assert_eq!(rebuilt.title, original.title);
	assert_eq!(rebuilt.tags, original.tags);
	assert_eq!(rebuilt.base, original.base);
}
