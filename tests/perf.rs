use std::time::Instant;

const BASE_URL: &str = "http://127.0.0.1:3000";
const NUM_USERS: usize = 100;
const POSTS_PER_USER: usize = 2;
const CELEBRITY_NAME: &str = "bob";
const CELEBRITY_PASSWORD: &str = "bob";
const CELEBRITY_POSTS: usize = 50;

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .cookie_store(true)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// Signs up or logs in; the session cookie lands in the client's jar.
async fn login(client: &reqwest::Client, username: &str, password: &str) -> bool {
    match client
        .post(BASE_URL)
        .form(&[("username", username), ("password", password)])
        .send()
        .await
    {
        Ok(resp) => resp.status() == 303,
        Err(_) => false,
    }
}

#[ignore]
#[tokio::test(flavor = "multi_thread")]
async fn perf_test_users_with_posts() {
    let start = Instant::now();

    println!("\n=== Performance Test ===");
    println!("Creating {} users with {} posts each...", NUM_USERS, POSTS_PER_USER);

    let mut sessions = Vec::new();

    let user_creation_start = Instant::now();
    for i in 0..NUM_USERS {
        let username = format!("perf_user_{}_{}", i, &uuid::Uuid::new_v4().simple().to_string()[0..8]);
        let client = client();
        if login(&client, &username, "password123").await {
            sessions.push((username, client));
        }

        if (i + 1) % 100 == 0 {
            println!("  Created {}/{} users", i + 1, NUM_USERS);
        }
    }
    let user_creation_time = user_creation_start.elapsed();

    println!(
        "User creation done: {} users in {:.2}s ({:.2} users/sec)",
        sessions.len(),
        user_creation_time.as_secs_f64(),
        sessions.len() as f64 / user_creation_time.as_secs_f64()
    );

    let post_creation_start = Instant::now();
    let mut posts_created = 0;
    let mut posts_failed = 0;

    for (idx, (_, client)) in sessions.iter().enumerate() {
        for post_num in 0..POSTS_PER_USER {
            let message = format!(
                "Post {} from user {} - Perf test at {}",
                post_num + 1,
                idx,
                chrono::Utc::now().to_rfc3339()
            );

            match client
                .post(format!("{}/post", BASE_URL))
                .form(&[("message", message)])
                .send()
                .await
            {
                Ok(resp) if resp.status() == 303 => posts_created += 1,
                _ => posts_failed += 1,
            }
        }

        if (idx + 1) % 50 == 0 {
            println!(
                "  Processed {}/{} users ({} posts created)",
                idx + 1,
                sessions.len(),
                posts_created
            );
        }
    }
    let post_creation_time = post_creation_start.elapsed();

    let total_time = start.elapsed();
    let total_requests = sessions.len() + posts_created + posts_failed;

    println!("\n=== Results ===");
    println!("Total time: {:.2}s", total_time.as_secs_f64());
    println!("User creation: {:.2}s", user_creation_time.as_secs_f64());
    println!("Post creation: {:.2}s", post_creation_time.as_secs_f64());
    println!("Users created: {}", sessions.len());
    println!("Posts created: {}", posts_created);
    println!("Posts failed: {}", posts_failed);
    println!("Total requests: {}", total_requests);
    println!(
        "Avg time per request: {:.2}ms",
        (total_time.as_secs_f64() * 1000.0) / total_requests as f64
    );
    println!(
        "Throughput: {:.0} requests/sec",
        total_requests as f64 / total_time.as_secs_f64()
    );
}

/// One author with many followers: every post costs one timeline push per
/// follower, so this measures fan-out on write.
#[ignore]
#[tokio::test(flavor = "multi_thread")]
async fn perf_test_fanout_to_many_followers() {
    println!("\n=== Fan-out Performance Test ===");

    let celebrity = client();
    if !login(&celebrity, CELEBRITY_NAME, CELEBRITY_PASSWORD).await {
        println!("Could not log in as '{}', aborting", CELEBRITY_NAME);
        return;
    }

    let follow_start = Instant::now();
    let mut followers = 0;
    for i in 0..NUM_USERS {
        let username = format!("fan_{}_{}", i, &uuid::Uuid::new_v4().simple().to_string()[0..8]);
        let fan = client();
        if !login(&fan, &username, "password123").await {
            continue;
        }
        let resp = fan
            .post(format!("{}/follow", BASE_URL))
            .form(&[("username", CELEBRITY_NAME)])
            .send()
            .await;
        if matches!(resp, Ok(r) if r.status() == 303) {
            followers += 1;
        }
    }
    println!(
        "{} followers ready in {:.2}s",
        followers,
        follow_start.elapsed().as_secs_f64()
    );

    let publish_start = Instant::now();
    let mut published = 0;
    for i in 0..CELEBRITY_POSTS {
        let resp = celebrity
            .post(format!("{}/post", BASE_URL))
            .form(&[("message", format!("Announcement #{}", i + 1))])
            .send()
            .await;
        if matches!(resp, Ok(r) if r.status() == 303) {
            published += 1;
        }
    }
    let publish_time = publish_start.elapsed();

    println!("\n=== Results ===");
    println!("Posts published: {}", published);
    println!("Timeline pushes: ~{}", published * (followers + 1));
    println!(
        "Avg publish latency: {:.2}ms",
        (publish_time.as_secs_f64() * 1000.0) / published.max(1) as f64
    );

    let read_start = Instant::now();
    let resp = celebrity.get(BASE_URL).send().await;
    match resp {
        Ok(r) => println!(
            "Home page: {} in {:.2}ms",
            r.status(),
            read_start.elapsed().as_secs_f64() * 1000.0
        ),
        Err(e) => println!("Home page failed: {}", e),
    }
}
