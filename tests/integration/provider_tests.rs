use super::*;
use scan_car::sources::providers::{
    BonbanhSource, ChototSource, OtoAnhLuongSource, XeLuotToanTrungSource,
};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const AD_LISTING: &str = "/v1/public/ad-listing";

fn api_base(server: &MockServer) -> String {
    format!("{}{}", server.uri(), AD_LISTING)
}

fn base_url(server: &MockServer) -> Url {
    Url::parse(&format!("{}/", server.uri())).unwrap()
}

#[tokio::test]
async fn test_chotot_listings_filter_non_cars() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(AD_LISTING))
        .and(query_param("cg", "2010"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ads": [
                { "list_id": 111, "subject": "Toyota Vios 2019", "price": 420000000,
                  "category": 2010, "car_year": 2019, "gearbox": 2, "area_name": "Buôn Ma Thuột" },
                { "list_id": "222", "subject": "Xe máy Honda Wave", "price": 15000000, "category": 2020 }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = ChototSource::with_api_base(&get_test_scraper_config(), &api_base(&server))?;
    let cars = source.fetch_listings().await?;

    assert_eq!(cars.len(), 1);
    assert_eq!(cars[0].id, "chotot-111");
    assert_eq!(cars[0].price_text, "420 triệu");
    assert_eq!(cars[0].brand, "Toyota");
    assert!(cars[0].url.as_deref().unwrap().ends_with("toyota-vios-2019-i111"));
    Ok(())
}

#[tokio::test]
async fn test_chotot_detail_through_service_is_cached() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/111", AD_LISTING)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ad": {
                "list_id": 111, "subject": "Toyota Vios 2019", "price": 420000000,
                "car_year": 2019, "brand_name": "Toyota", "model_name": "Vios",
                "phone": "0905 111 222", "images": ["https://cdn.chotot.com/1.jpg"],
                "body": "Xe gia đình"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = ChototSource::with_api_base(&get_test_scraper_config(), &api_base(&server))?;
    let service = DetailService::new(vec![Arc::new(source)], Duration::from_secs(60));

    let url = "https://xe.chotot.com/mua-ban-oto/toyota-vios-2019-i111.htm";
    let first = service.fetch(url, None).await?;
    let second = service.fetch(url, Some("chotot")).await?;

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.record.title, "Toyota Vios 2019");
    assert_eq!(first.record.description, "Xe gia đình");
    assert_eq!(first.record.gallery, vec!["https://cdn.chotot.com/1.jpg"]);
    assert_eq!(first.record.contact.hotline_link.as_deref(), Some("tel:0905111222"));
    Ok(())
}

#[tokio::test]
async fn test_chotot_server_error_becomes_source_error() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(AD_LISTING))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let chotot = ChototSource::with_api_base(&get_test_scraper_config(), &api_base(&server))?;
    let collector = Collector::new(vec![
        Arc::new(chotot),
        Arc::new(FakeSource::ok("other", &["Ford Everest"])),
    ]);
    let snapshot = collector.collect().await;

    assert_eq!(snapshot.listings.len(), 1);
    assert_eq!(snapshot.errors.len(), 1);
    assert_eq!(snapshot.errors[0].id, "chotot");
    assert!(snapshot.errors[0].message.contains("HTTP 503"));
    Ok(())
}

fn catalog_item(id: u32, title: &str) -> String {
    format!(
        r#"<div class="item">
             <div class="img_sp"><img src="/upload/{id}.jpg"></div>
             <h3 class="name_sp"><a href="xe-{id}">{title}</a></h3>
             <div class="gia_sp"><b>500.000.000 đ</b></div>
             <p class="id_ss" data-id="{id}"></p>
           </div>"#
    )
}

#[tokio::test]
async fn test_xeluottoantrung_follows_pagination() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let first_page = format!(
        r#"<div class="wap_item">{}{}</div>
           <ul class="pagination-home">
             <li><a class="page-link" href="san-pham">1</a></li>
             <li><a class="page-link" href="san-pham?p=2">2</a></li>
           </ul>"#,
        catalog_item(1, "Kia Sorento 2022"),
        catalog_item(2, "Kia Carnival 2023"),
    );
    let second_page = format!(
        r#"<div class="wap_item">{}{}</div>"#,
        catalog_item(2, "Kia Carnival 2023"),
        catalog_item(3, "Peugeot 3008 2021"),
    );

    Mock::given(method("GET"))
        .and(path("/san-pham"))
        .and(query_param("p", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(second_page))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/san-pham"))
        .and(|request: &wiremock::Request| request.url.query().is_none())
        .respond_with(ResponseTemplate::new(200).set_body_string(first_page))
        .expect(1)
        .mount(&server)
        .await;

    let source = XeLuotToanTrungSource::with_base_url(&get_test_scraper_config(), base_url(&server))?;
    let cars = source.fetch_listings().await?;

    let ids: Vec<&str> = cars.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["xeluottoantrung-1", "xeluottoantrung-2", "xeluottoantrung-3"]);
    assert_eq!(cars[2].brand, "Peugeot");
    assert_eq!(cars[0].thumbnail, format!("{}/upload/1.jpg", server.uri()));
    Ok(())
}

#[tokio::test]
async fn test_bonbanh_skips_failing_salon_and_serves_detail() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let salon_list = r#"
        <div class="salon_item"><a href="/salon-a"><span class="sl_title">Salon A</span></a></div>
        <div class="salon_item"><a href="/salon-b"><span class="sl_title">Salon B</span></a></div>
    "#;
    let salon_a = r#"
        <ul id="main_products">
          <li>
            <div class="item_title"><a href="/xe-kia-morning-2019-id,77"><b>Kia Morning 2019</b></a></div>
            <div class="item_price"><b>Giá: 265 Triệu</b></div>
          </li>
        </ul>
    "#;
    let detail = r#"
        <div id="detail_title"><p>Kia Morning 2019</p></div>
        <div class="price_list_car"><b>265 Triệu</b></div>
        <div id="item_head">Salon A</div>
    "#;

    Mock::given(method("GET"))
        .and(path("/salon-oto-xe-cu-dak-lak"))
        .respond_with(ResponseTemplate::new(200).set_body_string(salon_list))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/salon-a"))
        .respond_with(ResponseTemplate::new(200).set_body_string(salon_a))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/salon-b"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/xe-kia-morning-2019-id,77"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail))
        .expect(1)
        .mount(&server)
        .await;

    let source = Arc::new(BonbanhSource::with_hosts(
        &get_test_scraper_config(),
        base_url(&server),
        &["127.0.0.1", "localhost"],
    )?);

    let cars = source.fetch_listings().await?;
    assert_eq!(cars.len(), 1);
    assert_eq!(cars[0].id, "bonbanh-77");
    assert_eq!(cars[0].price_text, "265 Triệu");
    assert_eq!(cars[0].source_name, "Bonbanh (Đắk Lắk) - Salon A");

    let service = DetailService::new(vec![source], Duration::from_secs(60));
    let car_url = cars[0].url.clone().unwrap();
    let first = service.fetch(&car_url, Some("bonbanh")).await?;
    let again = service.fetch(&car_url, None).await?;

    assert_eq!(first.record.title, "Kia Morning 2019");
    assert_eq!(first.record.price_text, "265 Triệu");
    assert_eq!(first.record.contact.dealer.as_deref(), Some("Salon A"));
    assert!(again.cached);
    Ok(())
}

#[tokio::test]
async fn test_bonbanh_without_salons_fails() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/salon-oto-xe-cu-dak-lak"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .mount(&server)
        .await;

    let source = BonbanhSource::with_base_url(&get_test_scraper_config(), base_url(&server))?;
    let err = source.fetch_listings().await.unwrap_err();

    assert_eq!(err.to_string(), "No salons found in Đắk Lắk on Bonbanh");
    Ok(())
}

#[tokio::test]
async fn test_bonbanh_duplicate_car_keeps_first_salon() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let salon_list = r#"
        <div class="salon_item"><a href="/salon-a"><span class="sl_title">Salon A</span></a></div>
        <div class="salon_item"><a href="/salon-b"><span class="sl_title">Salon B</span></a></div>
    "#;
    let page = |price: &str| {
        format!(
            r#"<ul id="main_products"><li>
                 <div class="item_title"><a href="/xe-mazda-3-2020-id,91"><b>Mazda 3 2020</b></a></div>
                 <div class="item_price"><b>Giá: {}</b></div>
               </li></ul>"#,
            price
        )
    };

    Mock::given(method("GET"))
        .and(path("/salon-oto-xe-cu-dak-lak"))
        .respond_with(ResponseTemplate::new(200).set_body_string(salon_list))
        .mount(&server)
        .await;
    // the first salon answers last
    Mock::given(method("GET"))
        .and(path("/salon-a"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(page("550 Triệu"))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/salon-b"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page("530 Triệu")))
        .mount(&server)
        .await;

    let source = BonbanhSource::with_base_url(&get_test_scraper_config(), base_url(&server))?;
    let cars = source.fetch_listings().await?;

    assert_eq!(cars.len(), 1);
    assert_eq!(cars[0].id, "bonbanh-91");
    assert_eq!(cars[0].source_name, "Bonbanh (Đắk Lắk) - Salon A");
    assert_eq!(cars[0].price_text, "550 Triệu");
    Ok(())
}

#[tokio::test]
async fn test_bonbanh_detail_redirects_stay_on_allowed_hosts() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let port = server.address().port();
    let detail = r#"
        <div id="detail_title"><p>Kia Morning 2019</p></div>
        <div class="price_list_car"><b>265 Triệu</b></div>
    "#;

    Mock::given(method("GET"))
        .and(path("/xe-kia-morning-2019-id,77"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/xe-old-id,76"))
        .respond_with(ResponseTemplate::new(301).insert_header(
            "location",
            format!("http://127.0.0.1:{}/xe-kia-morning-2019-id,77", port).as_str(),
        ))
        .mount(&server)
        .await;
    // same server, but reached through a host name that is not allowed
    Mock::given(method("GET"))
        .and(path("/xe-moved-id,78"))
        .respond_with(ResponseTemplate::new(302).insert_header(
            "location",
            format!("http://localhost:{}/elsewhere", port).as_str(),
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/elsewhere"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail))
        .expect(0)
        .mount(&server)
        .await;

    let source = Arc::new(BonbanhSource::with_hosts(
        &get_test_scraper_config(),
        base_url(&server),
        &["127.0.0.1"],
    )?);
    let service = DetailService::new(vec![source], Duration::from_secs(60));

    let followed = service
        .fetch(&format!("http://127.0.0.1:{}/xe-old-id,76", port), Some("bonbanh"))
        .await?;
    assert_eq!(followed.record.title, "Kia Morning 2019");

    let refused = service
        .fetch(&format!("http://127.0.0.1:{}/xe-moved-id,78", port), Some("bonbanh"))
        .await
        .unwrap_err();
    assert!(refused.to_string().contains("HTTP 302"));
    assert_eq!(service.cache().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_otoanhluong_home_page_then_load_more() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let home = r#"
        <div id="al-car-all"><span>4 xe</span></div>
        <ul class="al-list-cars">
          <li class="al-item">
            <div class="car-home-tieu-de"><a class="al-car" href="/Xe-ford-everest-2019">Ford Everest 2019</a></div>
            <div class="al-box-price"><span class="al-price">820 triệu</span></div>
          </li>
          <li class="al-item">
            <div class="car-home-tieu-de"><a class="al-car" href="/Xe-honda-crv-2020">Honda CR-V 2020</a></div>
          </li>
        </ul>
    "#;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(home))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ajax/ajaxLoadMoreCars.php"))
        .and(body_string_contains("page=1"))
        .and(body_string_contains("action=2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errorCode": 0,
            "btn_status": 1,
            "page": 2,
            "listCars": [
                { "title": "Hyundai Santa Fe 2021", "url": "hyundai-santafe-2021", "botvn_car_id": "501",
                  "price": "1 tỷ 050 triệu", "car_year": 2021 },
                { "title": "Hyundai Santa Fe 2021", "url": "hyundai-santafe-2021", "botvn_car_id": 501 },
                { "title_car": "Kia Carnival 2022", "url": "kia-carnival-2022", "_make_name": "Kia" },
                { "url": "untitled" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = OtoAnhLuongSource::with_base_url(&get_test_scraper_config(), base_url(&server))?;
    let cars = source.fetch_listings().await?;

    let ids: Vec<&str> = cars.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "otoanhluong-Xe-ford-everest-2019",
            "otoanhluong-Xe-honda-crv-2020",
            "otoanhluong-501",
            "otoanhluong-kia-carnival-2022",
        ]
    );
    assert_eq!(cars[2].price_text, "1 tỷ 050 triệu");
    assert_eq!(cars[2].url, Some(format!("{}/Xe-hyundai-santafe-2021", server.uri())));
    assert_eq!(cars[3].brand, "Kia");
    Ok(())
}

#[tokio::test]
async fn test_otoanhluong_stops_when_button_disappears() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<ul class=\"al-list-cars\"></ul>"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ajax/ajaxLoadMoreCars.php"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errorCode": 0,
            "btn_status": 0,
            "page": 2,
            "listCars": [ { "title": "VinFast Lux A2.0", "botvn_car_id": 9 } ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = OtoAnhLuongSource::with_base_url(&get_test_scraper_config(), base_url(&server))?;
    let cars = source.fetch_listings().await?;

    assert_eq!(cars.len(), 1);
    assert_eq!(cars[0].id, "otoanhluong-9");
    Ok(())
}
