#![cfg(feature = "inmem-store")]

#[macro_use]
mod common;

use actix_web::test;
use serde_json::json;

#[actix_web::test]
async fn tag_crud_flow() {
    let env = common::env();
    let app = app!(env);

    let (status, tag) = post_json!(app, "/tags/create/", json!({"name": "  Landscape "}));
    assert_eq!(status, 201);
    assert_eq!(tag["name"], "Landscape");
    assert_eq!(tag["active"], true);
    let id = tag["id"].as_i64().unwrap();

    let (status, prefill) = get_json!(app, format!("/tags/edit/{id}"));
    assert_eq!(status, 200);
    assert_eq!(prefill["name"], "Landscape");

    let (status, updated) = post_json!(app, format!("/tags/edit/{id}"), json!({"name": "Seascape"}));
    assert_eq!(status, 200);
    assert_eq!(updated["name"], "Seascape");

    let (status, choices) = get_json!(app, "/tags/choices/");
    assert_eq!(status, 200);
    assert_eq!(choices, json!([{"id": id, "name": "Seascape"}]));

    let req = test::TestRequest::delete()
        .uri(&format!("/tags/delete/{id}"))
        .insert_header(common::bearer())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);

    let (status, _) = get_json!(app, format!("/tags/view/{id}"));
    assert_eq!(status, 404);
    let (_, page) = get_json!(app, "/tags/");
    assert_eq!(page["total"], 0);
}

#[actix_web::test]
async fn listing_sorts_and_paginates() {
    let env = common::env();
    let app = app!(env);
    for name in ["Cubism", "Baroque", "Art Deco"] {
        let (status, _) = post_json!(app, "/statuses/create/", json!({"name": name}));
        assert_eq!(status, 201);
    }

    let (status, page) = get_json!(app, "/statuses/?sort=name&per_page=2");
    assert_eq!(status, 200);
    let names: Vec<&str> = page["items"].as_array().unwrap().iter().map(|s| s["name"].as_str().unwrap()).collect();
    assert_eq!(names, ["Art Deco", "Baroque"]);
    assert_eq!(page["total"], 3);
    assert_eq!(page["pages"], 2);
    assert_eq!(page["has_next"], true);
    assert_eq!(page["has_prev"], false);

    let (_, page) = get_json!(app, "/statuses/?sort=name&order=desc&per_page=2&page=2");
    let names: Vec<&str> = page["items"].as_array().unwrap().iter().map(|s| s["name"].as_str().unwrap()).collect();
    assert_eq!(names, ["Art Deco"]);
    assert_eq!(page["has_prev"], true);

    let (_, page) = get_json!(app, "/statuses/?q=bar");
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["name"], "Baroque");

    let (status, page) = get_json!(app, "/statuses/?page=-1&per_page=2");
    assert_eq!(status, 200);
    assert_eq!(page["page"], 1);
    assert_eq!(page["items"].as_array().unwrap().len(), 2);
}

#[actix_web::test]
async fn blank_required_fields_are_rejected() {
    let env = common::env();
    let app = app!(env);

    let (status, body) = post_json!(app, "/artworks/create/", json!({"name": "   "}));
    assert_eq!(status, 422);
    assert_eq!(body["fields"]["name"], json!(["This field is required."]));
    assert!(body["fields"]["type_id"].is_array());

    let (status, body) = post_json!(app, "/artworks/create/", json!({"name": "Nocturne", "type_id": 999}));
    assert_eq!(status, 422);
    assert_eq!(body["fields"]["type_id"], json!(["Not a valid choice"]));

    let (status, body) = post_json!(app, "/clients/create/", json!({"name": "Ann", "phone": "12345678901234567"}));
    assert_eq!(status, 422);
    assert!(body["fields"]["phone"].is_array());
}

#[actix_web::test]
async fn typed_fields_are_field_errors() {
    let env = common::env();
    let app = app!(env);

    let (status, body) =
        post_json!(app, "/clients/create/", json!({"name": "Ann", "phone": "123", "birthday": "1990-13-45"}));
    assert_eq!(status, 422);
    assert_eq!(body["fields"]["birthday"], json!(["Not a valid date value."]));

    let (status, client) =
        post_json!(app, "/clients/create/", json!({"name": "Ann", "phone": "123", "birthday": "1990-04-01"}));
    assert_eq!(status, 201);
    assert_eq!(client["birthday"], "1990-04-01");

    let (_, kind) = post_json!(app, "/artwork_types/create/", json!({"name": "Drawing"}));
    let (status, body) =
        post_json!(app, "/artworks/create/", json!({"name": "Study", "type_id": kind["id"], "buy_price": "abc"}));
    assert_eq!(status, 422);
    assert_eq!(body["fields"]["buy_price"], json!(["Not a valid integer value."]));

    let (status, body) =
        post_json!(app, "/artworks/create/", json!({"name": "Study", "type_id": kind["id"], "buy_price": -1}));
    assert_eq!(status, 422);
    assert!(body["fields"]["buy_price"].is_array());

    let (status, artwork) =
        post_json!(app, "/artworks/create/", json!({"name": "Study", "type_id": kind["id"], "buy_price": "250"}));
    assert_eq!(status, 201);
    assert_eq!(artwork["buy_price"], 250);
}

#[actix_web::test]
async fn mutations_require_a_token() {
    let env = common::env();
    let app = app!(env);

    let req = test::TestRequest::post().uri("/tags/create/").set_json(json!({"name": "x"})).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::post()
        .uri("/tags/create/")
        .insert_header(("Authorization", "Bearer not-a-jwt"))
        .set_json(json!({"name": "x"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    // reads stay public
    let (status, _) = get_json!(app, "/tags/");
    assert_eq!(status, 200);
}

#[actix_web::test]
async fn missing_records_are_404() {
    let env = common::env();
    let app = app!(env);
    for uri in ["/tags/view/42", "/clients/edit/42", "/artworks/view/42", "/attachments/view/42", "/tags/view/abc"] {
        let (status, _) = get_json!(app, uri);
        assert_eq!(status, 404, "{uri}");
    }
    let (status, _) = post_json!(app, "/statuses/edit/42", json!({"name": ""}));
    assert_eq!(status, 404);
    let (status, _) = post_json!(app, "/offers/delete/42", json!({}));
    assert_eq!(status, 404);
}

#[actix_web::test]
async fn protected_delete_then_cascade() {
    let env = common::env();
    let app = app!(env);

    let (_, kind) = post_json!(app, "/artwork_types/create/", json!({"name": "Painting"}));
    let type_id = kind["id"].as_i64().unwrap();
    let (_, artwork) = post_json!(app, "/artworks/create/", json!({"name": "Nocturne", "type_id": type_id}));
    let artwork_id = artwork["id"].as_i64().unwrap();
    let (_, client) = post_json!(app, "/clients/create/", json!({"name": "Ann", "phone": "555"}));
    let (_, status_row) = post_json!(app, "/statuses/create/", json!({"name": "Open"}));
    let (status, offer) = post_json!(
        app,
        "/offers/create/",
        json!({"artwork_id": artwork_id, "client_id": client["id"], "status_id": status_row["id"], "price": 900})
    );
    assert_eq!(status, 201);

    let (status, body) = post_json!(app, format!("/artwork_types/delete/{type_id}"), json!({}));
    assert_eq!(status, 409);
    assert_eq!(body["error"], "Unable to delete the selected object");
    assert_eq!(body["blocked_by"], json!(["artworks"]));

    let (status, body) = post_json!(app, format!("/artworks/delete/{artwork_id}"), json!({}));
    assert_eq!(status, 409);
    assert_eq!(body["blocked_by"], json!(["offers"]));

    let (status, _) = post_json!(app, format!("/offers/delete/{}", offer["id"]), json!({}));
    assert_eq!(status, 204);
    let (status, _) = post_json!(app, format!("/artworks/delete/{artwork_id}"), json!({}));
    assert_eq!(status, 204);
    let (status, _) = post_json!(app, format!("/artwork_types/delete/{type_id}"), json!({}));
    assert_eq!(status, 204);
}

#[actix_web::test]
async fn tags_link_and_filter_artworks() {
    let env = common::env();
    let app = app!(env);

    let (_, kind) = post_json!(app, "/artwork_types/create/", json!({"name": "Print"}));
    let (_, artwork) = post_json!(app, "/artworks/create/", json!({"name": "Wave", "type_id": kind["id"]}));
    let (_, other) = post_json!(app, "/artworks/create/", json!({"name": "Fuji", "type_id": kind["id"]}));
    let (_, tag) = post_json!(app, "/tags/create/", json!({"name": "ukiyo-e"}));
    let (a, t) = (artwork["id"].as_i64().unwrap(), tag["id"].as_i64().unwrap());

    for _ in 0..2 {
        let (status, _) = post_json!(app, format!("/artworks/{a}/tags/{t}"), json!({}));
        assert_eq!(status, 204);
    }
    let (status, body) = post_json!(app, format!("/artworks/{a}/tags/999"), json!({}));
    assert_eq!(status, 422);
    assert_eq!(body["fields"]["tag_id"], json!(["Not a valid choice"]));

    let (_, page) = get_json!(app, format!("/artworks/?tag_id={t}"));
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["name"], "Wave");
    let (_, page) = get_json!(app, "/");
    assert_eq!(page["total"], 2);

    let (_, detail) = get_json!(app, format!("/artworks/view/{a}"));
    assert_eq!(detail["tags"][0]["name"], "ukiyo-e");
    assert_eq!(detail["artwork_type"]["name"], "Print");

    // a linked tag cannot go while its artwork is live
    let (status, body) = post_json!(app, format!("/tags/delete/{t}"), json!({}));
    assert_eq!(status, 409);
    assert_eq!(body["blocked_by"], json!(["artworks"]));

    let (status, _) = post_json!(app, format!("/artworks/delete/{a}"), json!({}));
    assert_eq!(status, 204);
    let (status, _) = post_json!(app, format!("/tags/delete/{t}"), json!({}));
    assert_eq!(status, 204);
    let (_, page) = get_json!(app, format!("/artworks/?tag_id={t}"));
    assert_eq!(page["total"], 0);

    let req = test::TestRequest::delete()
        .uri(&format!("/artworks/{}/tags/{t}", other["id"]))
        .insert_header(common::bearer())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);
}

#[actix_web::test]
async fn feature_values_and_search() {
    let env = common::env();
    let app = app!(env);

    let (_, painting) = post_json!(app, "/artwork_types/create/", json!({"name": "Painting"}));
    let (_, sculpture) = post_json!(app, "/artwork_types/create/", json!({"name": "Sculpture"}));
    let (_, medium) = post_json!(app, "/features/create/", json!({"name": "Medium", "type_id": painting["id"]}));
    let (_, canvas) = post_json!(app, "/artworks/create/", json!({"name": "Irises", "type_id": painting["id"]}));
    let (_, bronze) = post_json!(app, "/artworks/create/", json!({"name": "Thinker", "type_id": sculpture["id"]}));
    let (f, a) = (medium["id"].as_i64().unwrap(), canvas["id"].as_i64().unwrap());

    let (status, _) = get_json!(app, format!("/features/{f}/value/{}", bronze["id"]));
    assert_eq!(status, 404, "feature of another type");

    let (status, prefill) = get_json!(app, format!("/features/{f}/value/{a}"));
    assert_eq!(status, 200);
    assert_eq!(prefill["value"], serde_json::Value::Null);

    let (status, stored) = post_json!(app, format!("/features/{f}/value/{a}"), json!({"value": " oil "}));
    assert_eq!(status, 200);
    assert_eq!(stored["value"], "oil");
    let (status, again) = post_json!(app, format!("/features/{f}/value/{a}"), json!({"value": "tempera"}));
    assert_eq!(status, 200);
    assert_eq!(again["id"], stored["id"], "second write updates in place");

    let (_, detail) = get_json!(app, format!("/artworks/view/{a}"));
    assert_eq!(detail["values"][f.to_string()], "tempera");
    assert_eq!(detail["features"][0]["name"], "Medium");

    let (_, found) = get_json!(app, format!("/artworks/search/?feature_id={f}&value=tempera"));
    assert_eq!(found["total"], 1);
    assert_eq!(found["items"][0]["name"], "Irises");
    let (_, found) = get_json!(app, format!("/artworks/search/?feature_id={f}&value=oil"));
    assert_eq!(found["total"], 0);
    let (status, found) = get_json!(app, format!("/artworks/search/?feature_id={f}&value=tempera&page=-2"));
    assert_eq!(status, 200);
    assert_eq!(found["page"], 1);
    assert_eq!(found["total"], 1);

    let (status, body) = get_json!(app, format!("/artworks/search/?feature_id={f}"));
    assert_eq!(status, 422);
    assert!(body["fields"]["value"].is_array());

    let (_, features) = get_json!(app, format!("/features/?type_id={}", sculpture["id"]));
    assert_eq!(features["total"], 0);
}

#[actix_web::test]
async fn malformed_json_is_bad_request() {
    let env = common::env();
    let app = app!(env);
    let req = test::TestRequest::post()
        .uri("/tags/create/")
        .insert_header(common::bearer())
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}
